// dbbackup/src/database/mod.rs
pub mod mongo;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use crate::config::{AppConfig, ConnectionConfig, DbKind, OperationConfig};
use crate::errors::{BackupError, Result};
use crate::utils::Toolchain;

/// One database engine: connection lifecycle plus native dump and restore.
///
/// A handler starts disconnected. `dump` and `load` require a successful
/// `connect`; `close` may be called any number of times.
#[async_trait]
pub trait DatabaseHandler: Send {
    fn kind(&self) -> DbKind;

    fn connection(&self) -> &ConnectionConfig;

    fn is_connected(&self) -> bool;

    /// Opens a connection to verify the server is reachable with the
    /// configured credentials.
    async fn connect(&mut self) -> Result<()>;

    fn close(&mut self);

    /// Writes a native dump to `output` and returns the artifact produced,
    /// which is a directory for MongoDB.
    async fn dump(&mut self, output: &Path) -> Result<PathBuf>;

    /// Restores the database from an already decrypted and decompressed artifact.
    async fn load(&mut self, artifact: &Path) -> Result<()>;

    fn ensure_connected(&self, operation: &'static str) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BackupError::NotConnected(operation))
        }
    }
}

/// Builds the handler for `kind`. Nothing is connected yet.
pub fn create_handler(
    kind: DbKind,
    connection: ConnectionConfig,
    toolchain: Toolchain,
) -> Result<Box<dyn DatabaseHandler>> {
    let handler: Box<dyn DatabaseHandler> = match kind {
        DbKind::MySql => Box::new(mysql::MySqlHandler::new(connection, toolchain)),
        DbKind::Postgres => Box::new(postgres::PostgresHandler::new(connection, toolchain)),
        DbKind::Mongo => Box::new(mongo::MongoHandler::new(connection, toolchain)),
        DbKind::Sqlite => Box::new(sqlite::SqliteHandler::new(connection)?),
    };
    Ok(handler)
}

/// Connected handler that is closed when the session goes out of scope,
/// whichever way the operation ends.
pub struct Session {
    handler: Box<dyn DatabaseHandler>,
}

impl Session {
    pub async fn open(mut handler: Box<dyn DatabaseHandler>) -> Result<Self> {
        if let Err(e) = handler.connect().await {
            handler.close();
            return Err(e);
        }
        Ok(Self { handler })
    }

    pub fn handler_mut(&mut self) -> &mut dyn DatabaseHandler {
        self.handler.as_mut()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.handler.close();
    }
}

/// Public entry point for `test-connection`: connects, reports and closes.
pub async fn run_connection_test_flow(app_config: &AppConfig) -> anyhow::Result<()> {
    let test_config = match &app_config.operation {
        Some(OperationConfig::TestConnection(cfg)) => cfg,
        _ => anyhow::bail!("Connection test selected but no connection configuration found."),
    };

    let toolchain = Toolchain::new(app_config.tools_dir.as_deref());
    let handler = create_handler(test_config.kind, test_config.connection.clone(), toolchain)?;
    let session = Session::open(handler)
        .await
        .with_context(|| format!("Connection test for {} failed", test_config.kind))?;
    tracing::info!(
        kind = %test_config.kind,
        host = test_config.connection.host_or_default(),
        "✅ connection successful"
    );
    drop(session);
    Ok(())
}

pub(crate) fn require_database(connection: &ConnectionConfig, kind: DbKind) -> Result<&str> {
    connection.database().ok_or_else(|| {
        BackupError::InvalidConfig(format!("a database name is required for {kind}"))
    })
}

/// Creates the parent directory of a dump target if needed.
pub(crate) fn prepare_output(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub(crate) fn require_file(artifact: &Path) -> Result<()> {
    if artifact.is_file() {
        Ok(())
    } else if artifact.exists() {
        Err(BackupError::InvalidFormat(format!(
            "{} must be a single backup file",
            artifact.display()
        )))
    } else {
        Err(BackupError::ArtifactMissing(artifact.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_factory_builds_every_kind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for kind in [DbKind::MySql, DbKind::Postgres, DbKind::Mongo, DbKind::Sqlite] {
            let connection = ConnectionConfig {
                database: Some(dir.path().join("app.db").display().to_string()),
                ..Default::default()
            };
            let handler = create_handler(kind, connection, Toolchain::default())?;
            assert_eq!(handler.kind(), kind);
            assert!(!handler.is_connected());
        }
        Ok(())
    }

    #[test]
    fn test_sqlite_needs_a_path() {
        let result = create_handler(DbKind::Sqlite, ConnectionConfig::default(), Toolchain::default());
        assert!(matches!(result, Err(BackupError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_dump_before_connect_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut handler = create_handler(
            DbKind::Postgres,
            ConnectionConfig {
                database: Some("shop".to_string()),
                ..Default::default()
            },
            Toolchain::new(Some(dir.path())),
        )?;
        let result = handler.dump(&dir.path().join("shop.dump")).await;
        assert!(matches!(result, Err(BackupError::NotConnected(_))));
        Ok(())
    }

    struct CountingHandler {
        connection: ConnectionConfig,
        fail_connect: bool,
        connected: bool,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DatabaseHandler for CountingHandler {
        fn kind(&self) -> DbKind {
            DbKind::MySql
        }
        fn connection(&self) -> &ConnectionConfig {
            &self.connection
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        async fn connect(&mut self) -> Result<()> {
            if self.fail_connect {
                return Err(BackupError::Connection("refused".to_string()));
            }
            self.connected = true;
            Ok(())
        }
        fn close(&mut self) {
            self.connected = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        async fn dump(&mut self, output: &Path) -> Result<PathBuf> {
            Ok(output.to_path_buf())
        }
        async fn load(&mut self, _artifact: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_closes_on_drop_and_on_failed_connect() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handler = |fail_connect| {
            Box::new(CountingHandler {
                connection: ConnectionConfig::default(),
                fail_connect,
                connected: false,
                closes: closes.clone(),
            })
        };

        {
            let mut session = match Session::open(handler(false)).await {
                Ok(session) => session,
                Err(e) => panic!("connect failed: {e}"),
            };
            assert!(session.handler_mut().is_connected());
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        assert!(Session::open(handler(true)).await.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }
}
