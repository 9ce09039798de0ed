// dbbackup/src/storage/s3.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::{ArtifactStore, object_key};
use crate::config::{AwsConfig, CloudProvider, StoredArtifact};
use crate::errors::{BackupError, Result};

/// Uploads backups to S3 or an S3-compatible service (MinIO, Spaces, ...).
pub struct S3Store {
    aws_config: AwsConfig,
    bucket: String,
}

impl S3Store {
    pub fn new(aws_config: AwsConfig, bucket: String) -> Self {
        Self { aws_config, bucket }
    }
}

async fn build_client(aws_config: &AwsConfig) -> s3::Client {
    let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
        .region(Region::new(aws_config.region.clone()))
        .credentials_provider(s3::config::Credentials::new(
            &aws_config.access_key_id,
            &aws_config.secret_access_key,
            None, // session_token
            None, // expiry
            "Static",
        ));
    if let Some(endpoint_url) = &aws_config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    let sdk_config = loader.load().await;

    // Custom endpoints rarely support virtual-hosted buckets.
    let s3_config = s3::config::Builder::from(&sdk_config)
        .force_path_style(aws_config.endpoint_url.is_some())
        .build();
    s3::Client::from_conf(s3_config)
}

#[async_trait]
impl ArtifactStore for S3Store {
    async fn store(&self, artifact: &Path) -> Result<StoredArtifact> {
        let s3_key = object_key(artifact)?;
        tracing::info!(
            file = %artifact.display(),
            bucket = %self.bucket,
            key = %s3_key,
            "uploading backup to S3"
        );

        let client = build_client(&self.aws_config).await;
        let body = ByteStream::from_path(artifact)
            .await
            .map_err(|e| BackupError::Upload {
                provider: CloudProvider::Aws,
                cause: format!("failed to read {}: {e}", artifact.display()),
            })?;

        client
            .put_object()
            .bucket(&self.bucket)
            .key(&s3_key)
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::Upload {
                provider: CloudProvider::Aws,
                cause: DisplayErrorContext(e).to_string(),
            })?;

        tracing::info!(bucket = %self.bucket, key = %s3_key, "✓ uploaded to S3");
        Ok(StoredArtifact::Remote {
            provider: CloudProvider::Aws,
            bucket: self.bucket.clone(),
            key: s3_key,
        })
    }
}

/// Parses an S3 URI (s3://bucket/key) into bucket and key.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String)> {
    let invalid = |reason: &str| BackupError::InvalidConfig(format!("{reason}: {s3_uri}"));

    let uri = url::Url::parse(s3_uri).map_err(|_| invalid("Invalid S3 URI format"))?;
    if uri.scheme() != "s3" {
        return Err(invalid("S3 URI must start with s3://"));
    }
    let bucket = uri
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| invalid("S3 URI missing bucket name"))?
        .to_string();
    let key = uri.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Err(invalid("S3 URI missing key (object path)"));
    }
    Ok((bucket, key))
}

/// Downloads `s3://bucket/key` into `destination_dir`, keeping the key's
/// base name so the restore pipeline can still dispatch on the suffix.
pub async fn download_file_from_s3(
    aws_config: &AwsConfig,
    s3_uri: &str,
    destination_dir: &Path,
) -> Result<PathBuf> {
    let (bucket, key) = parse_s3_uri(s3_uri)?;
    let file_name = key.rsplit('/').next().unwrap_or(&key);
    let destination_path = destination_dir.join(file_name);
    tracing::info!(
        uri = %s3_uri,
        destination = %destination_path.display(),
        "downloading backup from S3"
    );

    tokio::fs::create_dir_all(destination_dir).await?;
    let client = build_client(aws_config).await;

    let mut object = client
        .get_object()
        .bucket(&bucket)
        .key(&key)
        .send()
        .await
        .map_err(|e| BackupError::Download(format!("{s3_uri}: {}", DisplayErrorContext(e))))?;

    let mut output_file = File::create(&destination_path).await?;
    let mut total_bytes_downloaded = 0;
    while let Some(bytes_chunk) = object
        .body
        .try_next()
        .await
        .map_err(|e| BackupError::Download(format!("{s3_uri}: {e}")))?
    {
        output_file.write_all(&bytes_chunk).await?;
        total_bytes_downloaded += bytes_chunk.len();
    }
    output_file.flush().await?;

    tracing::info!(
        bytes = total_bytes_downloaded,
        file = %destination_path.display(),
        "✓ downloaded from S3"
    );
    Ok(destination_path)
}
