// dbbackup/src/database/postgres.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection};

use super::{DatabaseHandler, prepare_output, require_database, require_file};
use crate::config::{ConnectionConfig, DbKind};
use crate::errors::{BackupError, Result};
use crate::utils::{ToolInvocation, Toolchain, has_suffix};

pub struct PostgresHandler {
    connection: ConnectionConfig,
    toolchain: Toolchain,
    conn: Option<PgConnection>,
}

impl PostgresHandler {
    pub fn new(connection: ConnectionConfig, toolchain: Toolchain) -> Self {
        Self {
            connection,
            toolchain,
            conn: None,
        }
    }

    fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new().host(self.connection.host_or_default());
        if let Some(port) = self.connection.port_or_default(DbKind::Postgres) {
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

/// The two restore paths PostgreSQL dumps can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RestoreFormat {
    /// Plain SQL script, replayed with `psql`.
    PlainSql,
    /// Custom-format archive, replayed with `pg_restore`.
    Custom,
}

impl RestoreFormat {
    pub(crate) fn detect(artifact: &Path) -> Result<Self> {
        if has_suffix(artifact, ".sql") {
            Ok(RestoreFormat::PlainSql)
        } else if has_suffix(artifact, ".dump") || has_suffix(artifact, ".backup") {
            Ok(RestoreFormat::Custom)
        } else {
            Err(BackupError::InvalidFormat(format!(
                "{} is not a PostgreSQL backup (.sql, .dump or .backup)",
                artifact.display()
            )))
        }
    }
}

fn connection_args(invocation: ToolInvocation, connection: &ConnectionConfig) -> ToolInvocation {
    invocation
        .arg("-h")
        .arg(connection.host_or_default())
        .opt_arg(
            "-p",
            connection
                .port_or_default(DbKind::Postgres)
                .map(|p| p.to_string()),
        )
        .opt_arg("-U", connection.user())
        .env("PGPASSWORD", connection.password())
}

/// Custom-format (`-F c`) dump including large objects.
pub(crate) fn dump_invocation(connection: &ConnectionConfig, output: &Path) -> Result<ToolInvocation> {
    let database = require_database(connection, DbKind::Postgres)?;
    Ok(connection_args(ToolInvocation::new("pg_dump"), connection)
        .arg("-d")
        .arg(database)
        .arg("-f")
        .arg(output)
        .arg("-b")
        .arg("-v")
        .arg("-F")
        .arg("c"))
}

pub(crate) fn restore_invocation(
    connection: &ConnectionConfig,
    artifact: &Path,
) -> Result<ToolInvocation> {
    let database = require_database(connection, DbKind::Postgres)?;
    let invocation = match RestoreFormat::detect(artifact)? {
        RestoreFormat::PlainSql => connection_args(ToolInvocation::new("psql"), connection)
            .arg("-X")
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-d")
            .arg(database)
            .arg("-f")
            .arg(artifact),
        RestoreFormat::Custom => connection_args(ToolInvocation::new("pg_restore"), connection)
            .arg("--no-owner")
            .arg("-v")
            .arg("-d")
            .arg(database)
            .arg(artifact),
    };
    Ok(invocation)
}

#[async_trait]
impl DatabaseHandler for PostgresHandler {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
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
        let conn = PgConnection::connect_with(&self.connect_options())
            .await
            .map_err(|e| {
                BackupError::Connection(format!(
                    "PostgreSQL at {} is not reachable: {e}",
                    self.connection.host_or_default()
                ))
            })?;
        self.conn = Some(conn);
        tracing::info!("PostgreSQL connection successful");
        Ok(())
    }

    fn close(&mut self) {
        if self.conn.take().is_some() {
            tracing::info!("PostgreSQL connection closed");
        }
    }

    async fn dump(&mut self, output: &Path) -> Result<PathBuf> {
        self.ensure_connected("dump")?;
        let invocation = dump_invocation(&self.connection, output)?;
        prepare_output(output)?;
        // pg_dump -v reports progress on stderr
        let result = self.toolchain.run(&invocation)?;
        tracing::debug!(output = %result.stderr.trim(), "pg_dump finished");
        tracing::info!(file = %output.display(), "✓ pg_dump finished");
        Ok(output.to_path_buf())
    }

    async fn load(&mut self, artifact: &Path) -> Result<()> {
        self.ensure_connected("restore")?;
        require_file(artifact)?;
        let invocation = restore_invocation(&self.connection, artifact)?;
        self.toolchain.run(&invocation)?;
        tracing::info!(
            file = %artifact.display(),
            tool = invocation.tool,
            "✓ PostgreSQL restore finished"
        );
        Ok(())
    }
}
