use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{
    BackupConfig, CloudProvider, ConnectionConfig, ConnectionTestConfig, DbKind, PipelineOptions,
    RestoreConfig, StorageTarget,
};
use crate::errors::Result;

#[derive(Parser, Debug)]
#[command(name = "dbbackup", version, about = "Back up and restore MySQL, PostgreSQL, MongoDB and SQLite databases", long_about = None)]
pub struct Cli {
    /// JSON configuration file. A missing file is not an error.
    #[arg(long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log debug output, including the native tool command lines.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump a database and store the result locally or in the cloud.
    Backup(BackupArgs),
    /// Restore a database from a local file or an s3:// URI.
    Restore(RestoreArgs),
    /// Check that the database accepts a connection.
    TestConnection(TestConnectionArgs),
    /// Recurring backups (not supported yet).
    Schedule,
    /// Print a new encryption key.
    Keygen,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    #[arg(long, env = "DB_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "DB_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name; for SQLite the path of the database file.
    #[arg(long, env = "DB_NAME")]
    pub database: Option<String>,
}

impl From<ConnectionArgs> for ConnectionConfig {
    fn from(args: ConnectionArgs) -> Self {
        ConnectionConfig {
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password,
            database: args.database,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Cloud,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// mysql, postgres, mongo or sqlite.
    #[arg(long)]
    pub db_type: DbKind,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, value_enum, default_value_t = StorageKind::Local)]
    pub storage: StorageKind,

    /// Where the dump is written: a file, or a directory for MongoDB.
    #[arg(long)]
    pub path: PathBuf,

    /// Local directory the finished backup is moved into.
    #[arg(long)]
    pub destination: Option<PathBuf>,

    /// aws, gcp or azure (cloud storage only).
    #[arg(long)]
    pub provider: Option<CloudProvider>,

    /// Bucket or container name (cloud storage only).
    #[arg(long)]
    pub bucket: Option<String>,

    /// Compress the dump (default).
    #[arg(long, overrides_with = "no_compress")]
    pub compress: bool,

    #[arg(long, overrides_with = "compress")]
    pub no_compress: bool,

    /// Encrypt the backup with the configured key.
    #[arg(long)]
    pub encrypt: bool,

    /// Post the outcome to a Slack-compatible webhook.
    #[arg(long)]
    pub notify_slack: bool,

    /// Overrides `slack_webhook_url` from the configuration.
    #[arg(long)]
    pub slack_webhook_url: Option<String>,

    /// Keep the raw dump and other intermediate files after a successful run.
    #[arg(long)]
    pub keep_intermediates: bool,
}

impl BackupArgs {
    pub fn into_config(self) -> Result<BackupConfig> {
        let target = StorageTarget::from_flags(
            self.storage == StorageKind::Cloud,
            self.destination,
            self.provider,
            self.bucket,
        )?;
        Ok(BackupConfig {
            kind: self.db_type,
            connection: self.connection.into(),
            output_path: self.path,
            target,
            options: PipelineOptions {
                compress: self.compress || !self.no_compress,
                encrypt: self.encrypt,
                notify: self.notify_slack,
                webhook_url: self.slack_webhook_url,
                keep_intermediates: self.keep_intermediates,
            },
        })
    }
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    #[arg(long)]
    pub db_type: DbKind,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Backup file or directory, or an s3://bucket/key URI.
    #[arg(long)]
    pub backup_path: String,
}

impl From<RestoreArgs> for RestoreConfig {
    fn from(args: RestoreArgs) -> Self {
        RestoreConfig {
            kind: args.db_type,
            connection: args.connection.into(),
            backup_source: args.backup_path,
        }
    }
}

#[derive(Args, Debug)]
pub struct TestConnectionArgs {
    #[arg(long)]
    pub db_type: DbKind,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl From<TestConnectionArgs> for ConnectionTestConfig {
    fn from(args: TestConnectionArgs) -> Self {
        ConnectionTestConfig {
            kind: args.db_type,
            connection: args.connection.into(),
        }
    }
}
