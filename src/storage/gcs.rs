use std::path::Path;

use async_trait::async_trait;

use super::{ArtifactStore, check_upload_response, object_key};
use crate::config::{CloudProvider, GcpConfig, StoredArtifact};
use crate::errors::{BackupError, Result};

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Uploads backups to Google Cloud Storage through the JSON API's simple
/// media upload, authenticated with an OAuth2 access token.
pub struct GcsStore {
    gcp_config: GcpConfig,
    bucket: String,
    http_client: reqwest::Client,
}

impl GcsStore {
    pub fn new(gcp_config: GcpConfig, bucket: String) -> Self {
        Self {
            gcp_config,
            bucket,
            http_client: reqwest::Client::new(),
        }
    }

    fn upload_url(&self, object_name: &str) -> Result<url::Url> {
        let endpoint = self
            .gcp_config
            .endpoint_url
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        let mut url = url::Url::parse(&format!("{endpoint}/upload/storage/v1/b/"))
            .map_err(|e| BackupError::InvalidConfig(format!("invalid GCS endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| BackupError::InvalidConfig("GCS endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .extend([self.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name);
        Ok(url)
    }
}

#[async_trait]
impl ArtifactStore for GcsStore {
    async fn store(&self, artifact: &Path) -> Result<StoredArtifact> {
        let object_name = object_key(artifact)?;
        let url = self.upload_url(&object_name)?;
        tracing::info!(
            file = %artifact.display(),
            bucket = %self.bucket,
            object = %object_name,
            "uploading backup to Google Cloud Storage"
        );

        let body = tokio::fs::read(artifact).await?;
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.gcp_config.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::Upload {
                provider: CloudProvider::Gcp,
                cause: e.to_string(),
            })?;
        check_upload_response(CloudProvider::Gcp, response).await?;

        tracing::info!(bucket = %self.bucket, object = %object_name, "✓ uploaded to GCS");
        Ok(StoredArtifact::Remote {
            provider: CloudProvider::Gcp,
            bucket: self.bucket.clone(),
            key: object_name,
        })
    }
}
