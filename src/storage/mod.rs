// dbbackup/src/storage/mod.rs
pub mod azure;
pub mod gcs;
pub mod local;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;

use crate::config::{AppConfig, CloudProvider, StorageTarget, StoredArtifact};
use crate::errors::{BackupError, Result};
use crate::utils::file_name_of;

/// Final destination of a backup artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, artifact: &Path) -> Result<StoredArtifact>;
}

/// Builds the store for `target`, failing early when the provider's
/// credentials are not configured.
pub fn for_target(target: &StorageTarget, app_config: &AppConfig) -> Result<Box<dyn ArtifactStore>> {
    let store: Box<dyn ArtifactStore> = match target {
        StorageTarget::Local { directory } => Box::new(local::LocalStore::new(directory.clone())),
        StorageTarget::Cloud { provider, bucket } => match provider {
            CloudProvider::Aws => {
                let aws = app_config
                    .aws
                    .clone()
                    .ok_or(BackupError::CredentialsMissing(CloudProvider::Aws))?;
                Box::new(s3::S3Store::new(aws, bucket.clone()))
            }
            CloudProvider::Gcp => {
                let gcp = app_config
                    .gcp
                    .clone()
                    .ok_or(BackupError::CredentialsMissing(CloudProvider::Gcp))?;
                Box::new(gcs::GcsStore::new(gcp, bucket.clone()))
            }
            CloudProvider::Azure => {
                let azure = app_config
                    .azure
                    .as_ref()
                    .ok_or(BackupError::CredentialsMissing(CloudProvider::Azure))?;
                Box::new(azure::AzureStore::from_connection_string(
                    &azure.connection_string,
                    bucket.clone(),
                )?)
            }
        },
    };
    Ok(store)
}

/// Object key for an uploaded artifact: its base file name. Directories
/// cannot be uploaded as a single object.
pub(crate) fn object_key(artifact: &Path) -> Result<String> {
    if artifact.is_dir() {
        return Err(BackupError::InvalidFormat(format!(
            "{} is a directory; compress it before uploading to cloud storage",
            artifact.display()
        )));
    }
    if !artifact.is_file() {
        return Err(BackupError::ArtifactMissing(artifact.to_path_buf()));
    }
    file_name_of(artifact)
}

/// Maps a failed HTTP exchange to an upload error carrying the status and body.
pub(crate) async fn check_upload_response(
    provider: CloudProvider,
    response: reqwest::Response,
) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackupError::Upload {
        provider,
        cause: format!("HTTP {status}: {}", body.trim()),
    })
}
