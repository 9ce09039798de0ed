use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::ArtifactStore;
use crate::config::StoredArtifact;
use crate::errors::{BackupError, Result};
use crate::utils::file_name_of;

/// Keeps backups on the local filesystem.
pub struct LocalStore {
    directory: Option<PathBuf>,
}

impl LocalStore {
    /// `None` leaves artifacts where the pipeline produced them.
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn store(&self, artifact: &Path) -> Result<StoredArtifact> {
        if !artifact.exists() {
            return Err(BackupError::ArtifactMissing(artifact.to_path_buf()));
        }
        let Some(directory) = &self.directory else {
            return Ok(StoredArtifact::Local(artifact.to_path_buf()));
        };

        fs::create_dir_all(directory)?;
        let destination = directory.join(file_name_of(artifact)?);
        if same_location(artifact, &destination) {
            return Ok(StoredArtifact::Local(destination));
        }

        move_path(artifact, &destination)?;
        tracing::info!(
            from = %artifact.display(),
            to = %destination.display(),
            "backup moved to local storage"
        );
        Ok(StoredArtifact::Local(destination))
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Renames, falling back to copy + delete when the rename crosses filesystems.
fn move_path(from: &Path, to: &Path) -> Result<()> {
    if to.is_dir() {
        fs::remove_dir_all(to)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err, "rename failed, copying instead");
            if from.is_dir() {
                copy_dir(from, to)?;
                fs::remove_dir_all(from)?;
            } else {
                fs::copy(from, to)?;
                fs::remove_file(from)?;
            }
            Ok(())
        }
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
