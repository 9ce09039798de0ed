// dbbackup/src/backup/encryption.rs
use std::fs;
use std::path::{Path, PathBuf};

use fernet::Fernet;

use crate::config::AppConfig;
use crate::errors::{BackupError, Result};
use crate::utils::{strip_suffix, with_suffix};

pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Whole-file symmetric encryption with a pre-shared Fernet key
/// (AES-128-CBC + HMAC-SHA256, url-safe base64 token).
///
/// Files are read fully into memory, so artifacts larger than available
/// memory cannot be encrypted.
pub struct Cipher {
    fernet: Fernet,
}

impl Cipher {
    /// `key` is 32 bytes encoded as url-safe base64.
    pub fn new(key: &str) -> Result<Self> {
        Fernet::new(key.trim())
            .map(|fernet| Self { fernet })
            .ok_or_else(|| {
                BackupError::InvalidConfig(
                    "encryption key must be 32 bytes of url-safe base64 (see `dbbackup keygen`)"
                        .to_string(),
                )
            })
    }

    pub fn from_config(app_config: &AppConfig) -> Result<Self> {
        let key = app_config
            .encryption_key
            .as_deref()
            .ok_or(BackupError::MissingKey)?;
        Self::new(key)
    }

    pub fn generate_key() -> String {
        Fernet::generate_key()
    }

    /// Encrypts `path` into `path.enc`. The plaintext file is left in place.
    pub fn encrypt_file(&self, path: &Path) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(BackupError::InvalidFormat(format!(
                "only single files can be encrypted, got {}",
                path.display()
            )));
        }
        let data = fs::read(path)?;
        let token = self.fernet.encrypt(&data);

        let encrypted_file_path = with_suffix(path, ENCRYPTED_SUFFIX);
        fs::write(&encrypted_file_path, token)?;
        tracing::info!(file = %encrypted_file_path.display(), "encrypted backup written");
        Ok(encrypted_file_path)
    }

    /// Decrypts `name.enc` into `name`. The ciphertext is left in place.
    pub fn decrypt_file(&self, path: &Path) -> Result<PathBuf> {
        let original_file_path = strip_suffix(path, ENCRYPTED_SUFFIX).ok_or_else(|| {
            BackupError::InvalidFormat(format!(
                "{} does not have the expected {ENCRYPTED_SUFFIX} extension",
                path.display()
            ))
        })?;
        if !path.is_file() {
            return Err(BackupError::ArtifactMissing(path.to_path_buf()));
        }

        let token = String::from_utf8(fs::read(path)?)
            .map_err(|_| BackupError::Decryption(path.to_path_buf()))?;
        let data = self
            .fernet
            .decrypt(token.trim())
            .map_err(|_| BackupError::Decryption(path.to_path_buf()))?;

        fs::write(&original_file_path, data)?;
        tracing::info!(file = %original_file_path.display(), "decrypted backup written");
        Ok(original_file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_reproduces_bytes() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let cipher = Cipher::new(&Cipher::generate_key())?;
        let plain = work.path().join("pg.dump.gz");
        let payload: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        fs::write(&plain, &payload)?;

        let encrypted = cipher.encrypt_file(&plain)?;
        assert_eq!(encrypted, work.path().join("pg.dump.gz.enc"));
        assert_ne!(fs::read(&encrypted)?, payload);
        assert!(plain.exists());

        fs::remove_file(&plain)?;
        let decrypted = cipher.decrypt_file(&encrypted)?;
        assert_eq!(decrypted, plain);
        assert_eq!(fs::read(&decrypted)?, payload);
        assert!(encrypted.exists());
        Ok(())
    }

    #[test]
    fn test_decrypt_requires_enc_suffix() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let cipher = Cipher::new(&Cipher::generate_key())?;
        let plain = work.path().join("shop.sql");
        fs::write(&plain, "SELECT 1;")?;

        assert!(matches!(
            cipher.decrypt_file(&plain),
            Err(BackupError::InvalidFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let plain = work.path().join("shop.sql");
        fs::write(&plain, "INSERT INTO t VALUES (1);")?;

        let encrypted = Cipher::new(&Cipher::generate_key())?.encrypt_file(&plain)?;
        let other = Cipher::new(&Cipher::generate_key())?;
        assert!(matches!(
            other.decrypt_file(&encrypted),
            Err(BackupError::Decryption(_))
        ));
        Ok(())
    }

    #[test]
    fn test_key_validation() {
        assert!(matches!(
            Cipher::new("too-short"),
            Err(BackupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_key_in_config() -> anyhow::Result<()> {
        let config = AppConfig::from_sources(Default::default(), |_| None);
        assert!(matches!(
            Cipher::from_config(&config),
            Err(BackupError::MissingKey)
        ));
        Ok(())
    }
}
