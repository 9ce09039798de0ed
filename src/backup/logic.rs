use std::fs;
use std::path::{Path, PathBuf};

use super::Stage;
use super::archive::{create_tar_gz_archive, gzip_file};
use super::encryption::Cipher;
use crate::config::{BackupConfig, StoredArtifact};
use crate::database::DatabaseHandler;
use crate::errors::{BackupError, Result};
use crate::notify::Notifier;
use crate::storage::ArtifactStore;
use crate::utils::with_suffix;

/// Runs dump → compress → encrypt → store → notify on a connected handler.
///
/// Every file or directory the pipeline creates is tracked. On success the
/// ones superseded by a later stage are deleted (unless the options ask to
/// keep them); on failure all of them stay on disk and are listed in the
/// returned [`BackupError::Pipeline`].
pub async fn perform_backup(
    handler: &mut dyn DatabaseHandler,
    config: &BackupConfig,
    cipher: Option<&Cipher>,
    store: &dyn ArtifactStore,
    notifier: Option<&dyn Notifier>,
) -> Result<StoredArtifact> {
    handler.ensure_connected("backup")?;
    let cipher = match (config.options.encrypt, cipher) {
        (true, None) => return Err(BackupError::MissingKey),
        (true, Some(cipher)) => Some(cipher),
        (false, _) => None,
    };

    let mut produced: Vec<PathBuf> = Vec::new();
    tracing::info!(
        kind = %handler.kind(),
        database = handler.connection().database().unwrap_or("-"),
        output = %config.output_path.display(),
        "starting backup"
    );

    let output_preexisted = config.output_path.exists();
    let mut current = match handler.dump(&config.output_path).await {
        Ok(artifact) => artifact,
        Err(err) => {
            // a failed tool may leave a partial file behind
            if !output_preexisted && config.output_path.exists() {
                produced.push(config.output_path.clone());
            }
            return Err(fail(Stage::Dump, err, produced, notifier).await);
        }
    };
    produced.push(current.clone());

    if config.options.compress {
        match compress(&current) {
            Ok(compressed) => {
                produced.push(compressed.clone());
                current = compressed;
            }
            Err(err) => return Err(fail(Stage::Compress, err, produced, notifier).await),
        }
    }

    if let Some(cipher) = cipher {
        match cipher.encrypt_file(&current) {
            Ok(encrypted) => {
                produced.push(encrypted.clone());
                current = encrypted;
            }
            Err(err) => return Err(fail(Stage::Encrypt, err, produced, notifier).await),
        }
    }

    let stored = match store.store(&current).await {
        Ok(stored) => stored,
        Err(err) => return Err(fail(Stage::Store, err, produced, notifier).await),
    };
    tracing::info!(location = %stored, "✓ backup stored");

    // The last entry is what was handed to the store.
    produced.pop();
    if config.options.keep_intermediates {
        tracing::info!(count = produced.len(), "keeping intermediate artifacts");
    } else {
        remove_intermediates(&produced);
    }

    if let Some(notifier) = notifier {
        notifier.notify(&format!("Backup successful: {stored}")).await;
    }
    Ok(stored)
}

/// Directories become `dir.tar.gz`, single files `file.gz`.
fn compress(artifact: &Path) -> Result<PathBuf> {
    if artifact.is_dir() {
        create_tar_gz_archive(artifact, &with_suffix(artifact, ".tar.gz"))
    } else {
        gzip_file(artifact)
    }
}

async fn fail(
    stage: Stage,
    err: BackupError,
    retained: Vec<PathBuf>,
    notifier: Option<&dyn Notifier>,
) -> BackupError {
    tracing::error!(%stage, error = %err, "backup failed");
    if let Some(notifier) = notifier {
        notifier
            .notify(&format!("Backup failed at {stage} stage: {err}"))
            .await;
    }
    BackupError::Pipeline {
        stage,
        retained,
        source: Box::new(err),
    }
}

fn remove_intermediates(paths: &[PathBuf]) {
    for path in paths {
        let removed = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match removed {
            Ok(()) => tracing::debug!(path = %path.display(), "removed intermediate artifact"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not remove intermediate artifact")
            }
        }
    }
}
