// dbbackup/src/config/target.rs
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{BackupError, Result};

/// The database engines a handler can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    MySql,
    Postgres,
    Mongo,
    Sqlite,
}

impl DbKind {
    pub fn default_port(self) -> Option<u16> {
        match self {
            DbKind::MySql => Some(3306),
            DbKind::Postgres => Some(5432),
            DbKind::Mongo => Some(27017),
            DbKind::Sqlite => None,
        }
    }
}

impl FromStr for DbKind {
    type Err = BackupError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(DbKind::MySql),
            "postgres" | "postgresql" => Ok(DbKind::Postgres),
            "mongo" | "mongodb" => Ok(DbKind::Mongo),
            "sqlite" => Ok(DbKind::Sqlite),
            _ => Err(BackupError::UnsupportedKind(tag.to_string())),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbKind::MySql => "mysql",
            DbKind::Postgres => "postgres",
            DbKind::Mongo => "mongo",
            DbKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Connection parameters for one database. For SQLite `database` is the
/// path of the database file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl ConnectionConfig {
    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().filter(|h| !h.is_empty()).unwrap_or("localhost")
    }

    pub fn port_or_default(&self, kind: DbKind) -> Option<u16> {
        self.port.or(kind.default_port())
    }

    /// Non-empty user name, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref().filter(|u| !u.is_empty())
    }

    /// Non-empty password, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref().filter(|d| !d.is_empty())
    }
}

// Keeps the password out of logs and error reports.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl FromStr for CloudProvider {
    type Err = BackupError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "aws" | "s3" => Ok(CloudProvider::Aws),
            "gcp" | "gcs" => Ok(CloudProvider::Gcp),
            "azure" => Ok(CloudProvider::Azure),
            other => Err(BackupError::InvalidConfig(format!(
                "Unsupported cloud provider '{other}'. Choose aws, gcp or azure."
            ))),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
        };
        f.write_str(name)
    }
}

/// Where the final artifact of a backup goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    /// Move into `directory`; `None` keeps the artifact where it was produced.
    Local { directory: Option<PathBuf> },
    Cloud { provider: CloudProvider, bucket: String },
}

impl StorageTarget {
    /// Builds a target from the loosely typed command-line flags. Cloud
    /// storage needs both a provider and a bucket.
    pub fn from_flags(
        cloud: bool,
        directory: Option<PathBuf>,
        provider: Option<CloudProvider>,
        bucket: Option<String>,
    ) -> Result<Self> {
        if !cloud {
            return Ok(StorageTarget::Local { directory });
        }
        match (provider, bucket.filter(|b| !b.trim().is_empty())) {
            (Some(provider), Some(bucket)) => Ok(StorageTarget::Cloud { provider, bucket }),
            _ => Err(BackupError::InvalidConfig(
                "Cloud provider and bucket name are required for cloud storage.".to_string(),
            )),
        }
    }
}

/// Which optional stages of the backup pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub compress: bool,
    pub encrypt: bool,
    pub notify: bool,
    pub webhook_url: Option<String>,
    pub keep_intermediates: bool,
}

/// Final resting place of a stored backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredArtifact {
    Local(PathBuf),
    Remote {
        provider: CloudProvider,
        bucket: String,
        key: String,
    },
}

impl fmt::Display for StoredArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredArtifact::Local(path) => write!(f, "{}", path.display()),
            StoredArtifact::Remote { provider, bucket, key } => {
                let scheme = match provider {
                    CloudProvider::Aws => "s3",
                    CloudProvider::Gcp => "gs",
                    CloudProvider::Azure => "azure",
                };
                write!(f, "{scheme}://{bucket}/{key}")
            }
        }
    }
}
