// dbbackup/src/config/mod.rs
mod target;

pub use target::{
    CloudProvider, ConnectionConfig, DbKind, PipelineOptions, StorageTarget, StoredArtifact,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonAwsConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonGcpConfig {
    pub access_token: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonAzureConfig {
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub encryption_key: Option<String>,
    pub tools_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub slack_webhook_url: Option<String>,
    pub aws: Option<JsonAwsConfig>,
    pub gcp: Option<JsonGcpConfig>,
    pub azure: Option<JsonAzureConfig>,
}

// Application's internal configuration structs
#[derive(Clone)]
pub struct AwsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub endpoint_url: Option<String>,
}

#[derive(Clone)]
pub struct GcpConfig {
    pub access_token: String,
    pub endpoint_url: Option<String>,
}

#[derive(Clone)]
pub struct AzureConfig {
    pub connection_string: String,
}

const DEFAULT_AWS_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub kind: DbKind,
    pub connection: ConnectionConfig,
    /// Where the dump tool writes: a file, or a directory for MongoDB.
    pub output_path: PathBuf,
    pub target: StorageTarget,
    pub options: PipelineOptions,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub kind: DbKind,
    pub connection: ConnectionConfig,
    /// Local path or `s3://bucket/key` URI of the backup.
    pub backup_source: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionTestConfig {
    pub kind: DbKind,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone)]
pub enum OperationConfig {
    Backup(BackupConfig),
    Restore(RestoreConfig),
    TestConnection(ConnectionTestConfig),
}

/// Process-wide settings, read once at startup and passed by reference.
#[derive(Clone)]
pub struct AppConfig {
    pub operation: Option<OperationConfig>,
    pub encryption_key: Option<String>,
    pub tools_dir: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub slack_webhook_url: Option<String>,
    pub aws: Option<AwsConfig>,
    pub gcp: Option<GcpConfig>,
    pub azure: Option<AzureConfig>,
}

impl AppConfig {
    /// Loads `.env`, the optional JSON config file and the process environment.
    /// Environment variables win over values from the file.
    pub fn load(config_path: &Path) -> Result<Self> {
        dotenv::dotenv().ok();

        let raw = if config_path.exists() {
            let config_content = fs::read_to_string(config_path).with_context(|| {
                format!("Failed to read config file at {}", config_path.display())
            })?;
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "config file not found, using environment only"
            );
            RawJsonConfig::default()
        };

        Ok(Self::from_sources(raw, |name| std::env::var(name).ok()))
    }

    pub fn from_sources(raw: RawJsonConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());

        let raw_aws = raw.aws.clone().unwrap_or_default();
        let aws_section_present = raw.aws.is_some();
        let aws = match (
            env("AWS_ACCESS_KEY_ID").or_else(|| non_empty(&raw_aws.access_key_id)),
            env("AWS_SECRET_ACCESS_KEY").or_else(|| non_empty(&raw_aws.secret_access_key)),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(AwsConfig {
                access_key_id,
                secret_access_key,
                region: env("AWS_REGION")
                    .or_else(|| non_empty(&raw_aws.region))
                    .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
                endpoint_url: env("AWS_ENDPOINT_URL").or_else(|| non_empty(&raw_aws.endpoint_url)),
            }),
            (None, None) if !aws_section_present => None,
            _ => {
                // Only warn if some AWS fields were provided but are incomplete
                tracing::warn!(
                    "AWS configuration is present but access_key_id or secret_access_key is missing. S3 operations will be disabled."
                );
                None
            }
        };

        let raw_gcp = raw.gcp.clone().unwrap_or_default();
        let gcp = match env("GCP_ACCESS_TOKEN").or_else(|| non_empty(&raw_gcp.access_token)) {
            Some(access_token) => Some(GcpConfig {
                access_token,
                endpoint_url: env("GCP_STORAGE_ENDPOINT").or_else(|| non_empty(&raw_gcp.endpoint_url)),
            }),
            None => {
                if raw.gcp.is_some() {
                    tracing::warn!(
                        "GCP configuration is present but access_token is missing. GCS uploads will be disabled."
                    );
                }
                None
            }
        };

        let azure = env("AZURE_STORAGE_CONNECTION_STRING")
            .or_else(|| raw.azure.as_ref().and_then(|a| non_empty(&a.connection_string)))
            .map(|connection_string| AzureConfig { connection_string });

        AppConfig {
            operation: None, // To be filled by main after parsing CLI args
            encryption_key: env("ENCRYPTION_KEY").or_else(|| non_empty(&raw.encryption_key)),
            tools_dir: env("DBBACKUP_TOOLS_DIR").map(PathBuf::from).or(raw.tools_dir),
            work_dir: env("DBBACKUP_WORK_DIR")
                .map(PathBuf::from)
                .or(raw.work_dir)
                .unwrap_or_else(|| std::env::temp_dir().join("dbbackup")),
            slack_webhook_url: env("SLACK_WEBHOOK_URL").or_else(|| non_empty(&raw.slack_webhook_url)),
            aws,
            gcp,
            azure,
        }
    }
}
