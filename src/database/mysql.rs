// dbbackup/src/database/mysql.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;

use super::{DatabaseHandler, prepare_output, require_database, require_file};
use crate::config::{ConnectionConfig, DbKind};
use crate::errors::{BackupError, Result};
use crate::utils::{ToolInvocation, Toolchain, has_suffix};

pub struct MySqlHandler {
    connection: ConnectionConfig,
    toolchain: Toolchain,
    conn: Option<MySqlConnection>,
}

impl MySqlHandler {
    pub fn new(connection: ConnectionConfig, toolchain: Toolchain) -> Self {
        Self {
            connection,
            toolchain,
            conn: None,
        }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new().host(self.connection.host_or_default());
        if let Some(port) = self.connection.port_or_default(DbKind::MySql) {
            options = options.port(port);
        }
        if let Some(user) = self.connection.user() {
            options = options.username(user);
        }
        if let Some(password) = self.connection.password() {
            options = options.password(password);
        }
        if let Some(database) = self.connection.database() {
            options = options.database(database);
        }
        options
    }
}

/// `mysqldump` writes to stdout, which is redirected into `output`.
/// The password travels in `MYSQL_PWD` so it never shows up in `ps`.
pub(crate) fn dump_invocation(connection: &ConnectionConfig, output: &Path) -> Result<ToolInvocation> {
    let database = require_database(connection, DbKind::MySql)?;
    Ok(client_args(ToolInvocation::new("mysqldump"), connection)
        .arg("--single-transaction")
        .arg("--routines")
        .arg("--triggers")
        .arg(database)
        .stdout_to(output))
}

pub(crate) fn restore_invocation(connection: &ConnectionConfig, dump_file: &Path) -> Result<ToolInvocation> {
    let database = require_database(connection, DbKind::MySql)?;
    Ok(client_args(ToolInvocation::new("mysql"), connection)
        .arg(database)
        .stdin_from(dump_file))
}

fn client_args(invocation: ToolInvocation, connection: &ConnectionConfig) -> ToolInvocation {
    invocation
        .arg("-h")
        .arg(connection.host_or_default())
        .opt_arg(
            "-P",
            connection
                .port_or_default(DbKind::MySql)
                .map(|p| p.to_string()),
        )
        .opt_arg("-u", connection.user())
        .env("MYSQL_PWD", connection.password())
}

#[async_trait]
impl DatabaseHandler for MySqlHandler {
    fn kind(&self) -> DbKind {
        DbKind::MySql
    }

    fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = MySqlConnection::connect_with(&self.connect_options())
            .await
            .map_err(|e| {
                BackupError::Connection(format!(
                    "MySQL at {} is not reachable: {e}",
                    self.connection.host_or_default()
                ))
            })?;
        self.conn = Some(conn);
        tracing::info!("MySQL connection successful");
        Ok(())
    }

    fn close(&mut self) {
        if self.conn.take().is_some() {
            tracing::info!("MySQL connection closed");
        }
    }

    async fn dump(&mut self, output: &Path) -> Result<PathBuf> {
        self.ensure_connected("dump")?;
        let invocation = dump_invocation(&self.connection, output)?;
        prepare_output(output)?;
        self.toolchain.run(&invocation)?;
        tracing::info!(file = %output.display(), "✓ mysqldump finished");
        Ok(output.to_path_buf())
    }

    async fn load(&mut self, artifact: &Path) -> Result<()> {
        self.ensure_connected("restore")?;
        require_file(artifact)?;
        if !has_suffix(artifact, ".sql") {
            return Err(BackupError::InvalidFormat(format!(
                "MySQL restores need a .sql dump, got {}",
                artifact.display()
            )));
        }
        self.toolchain.run(&restore_invocation(&self.connection, artifact)?)?;
        tracing::info!(file = %artifact.display(), "✓ MySQL restore finished");
        Ok(())
    }
}
