use std::path::PathBuf;

use thiserror::Error;

use crate::backup::Stage;
use crate::config::CloudProvider;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Handler is not connected; call connect before {0}")]
    NotConnected(&'static str),

    #[error("{0} executable not found in PATH. Please ensure the database client tools are installed and in your PATH.")]
    ToolNotFound(String),

    #[error("{tool} failed with {}: {stderr}", .exit_code.map_or_else(|| "no exit code (terminated by signal)".to_string(), |c| format!("exit code {c}")))]
    ToolExecution {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("No encryption key configured. Set ENCRYPTION_KEY or `encryption_key` in the config file.")]
    MissingKey,

    #[error("Failed to decrypt {}: wrong key or corrupted file", .0.display())]
    Decryption(PathBuf),

    #[error("Credentials for {0} are missing or incomplete")]
    CredentialsMissing(CloudProvider),

    #[error("Upload to {provider} failed: {cause}")]
    Upload { provider: CloudProvider, cause: String },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Unsupported database type: {0}")]
    UnsupportedKind(String),

    #[error("Backup file not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage} stage failed: {source}")]
    Pipeline {
        stage: Stage,
        retained: Vec<PathBuf>,
        source: Box<BackupError>,
    },
}

impl BackupError {
    /// Artifacts left on disk by a failed pipeline run.
    pub fn retained_artifacts(&self) -> &[PathBuf] {
        match self {
            BackupError::Pipeline { retained, .. } => retained,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
