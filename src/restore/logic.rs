use std::path::{Path, PathBuf};

use crate::backup::archive::decompress_by_suffix;
use crate::backup::encryption::{Cipher, ENCRYPTED_SUFFIX};
use crate::database::DatabaseHandler;
use crate::errors::{BackupError, Result};
use crate::utils::has_suffix;

/// Decrypts (`.enc`) and decompresses (`.gz`, `.tar.gz`, `.tgz`) a local
/// backup next to where it lies, then hands the result to the handler's
/// native restore. Returns the path that was restored from.
pub async fn perform_restore(
    handler: &mut dyn DatabaseHandler,
    backup_path: &Path,
    cipher: Option<&Cipher>,
) -> Result<PathBuf> {
    handler.ensure_connected("restore")?;
    if !backup_path.exists() {
        return Err(BackupError::ArtifactMissing(backup_path.to_path_buf()));
    }
    tracing::info!(kind = %handler.kind(), file = %backup_path.display(), "starting restore");

    let decrypted = if has_suffix(backup_path, ENCRYPTED_SUFFIX) {
        cipher
            .ok_or(BackupError::MissingKey)?
            .decrypt_file(backup_path)?
    } else {
        backup_path.to_path_buf()
    };
    let prepared = decompress_by_suffix(&decrypted)?;

    handler.load(&prepared).await?;
    tracing::info!(source = %prepared.display(), "✓ restore completed");
    Ok(prepared)
}
