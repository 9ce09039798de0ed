// dbbackup/src/database/sqlite.rs
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};

use super::{DatabaseHandler, prepare_output, require_file};
use crate::config::{ConnectionConfig, DbKind};
use crate::errors::{BackupError, Result};
use crate::utils::{parent_dir, with_suffix};

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// SQLite needs no native tools: the live connection writes a consistent
/// copy with `VACUUM INTO`, and restores replace the database file.
pub struct SqliteHandler {
    connection: ConnectionConfig,
    db_path: PathBuf,
    conn: Option<SqliteConnection>,
}

impl SqliteHandler {
    pub fn new(connection: ConnectionConfig) -> Result<Self> {
        let db_path = connection
            .database()
            .map(PathBuf::from)
            .ok_or_else(|| {
                BackupError::InvalidConfig(
                    "SQLite needs the database file path as the database name".to_string(),
                )
            })?;
        Ok(Self {
            connection,
            db_path,
            conn: None,
        })
    }
}

async fn open_db(db_path: PathBuf) -> Result<SqliteConnection> {
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    SqliteConnection::connect_with(&options).await.map_err(|e| {
        BackupError::Connection(format!(
            "SQLite database {} cannot be opened: {e}",
            db_path.display()
        ))
    })
}

/// Stages a copy of `artifact` next to `db_path` and renames it into place,
/// so a failed copy never touches the live database file.
fn replace_database(artifact: &Path, db_path: &Path) -> Result<()> {
    let mut staged = tempfile::NamedTempFile::new_in(parent_dir(db_path))?;
    io::copy(&mut File::open(artifact)?, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    check_header(staged.path())?;
    staged.persist(db_path).map_err(|e| BackupError::Io(e.error))?;

    for stale in ["-wal", "-shm"] {
        let sidecar = with_suffix(db_path, stale);
        if sidecar.exists() {
            fs::remove_file(sidecar)?;
        }
    }
    Ok(())
}

fn check_header(artifact: &Path) -> Result<()> {
    let mut header = [0u8; 16];
    let read = File::open(artifact)?.read(&mut header)?;
    if read < header.len() || &header != SQLITE_HEADER {
        return Err(BackupError::InvalidFormat(format!(
            "{} is not a SQLite database file",
            artifact.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl DatabaseHandler for SqliteHandler {
    fn kind(&self) -> DbKind {
        DbKind::Sqlite
    }

    fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.conn.is_none() {
            self.conn = Some(open_db(self.db_path.clone()).await?);
            tracing::info!(file = %self.db_path.display(), "SQLite connection successful");
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.conn.take().is_some() {
            tracing::info!("SQLite connection closed");
        }
    }

    async fn dump(&mut self, output: &Path) -> Result<PathBuf> {
        let conn = self.conn.as_mut().ok_or(BackupError::NotConnected("dump"))?;
        prepare_output(output)?;
        // VACUUM INTO refuses to overwrite an existing file
        if output.exists() {
            fs::remove_file(output)?;
        }
        sqlx::query("VACUUM INTO ?")
            .bind(output.to_string_lossy().into_owned())
            .execute(&mut *conn)
            .await?;
        tracing::info!(file = %output.display(), "✓ SQLite snapshot written");
        Ok(output.to_path_buf())
    }

    async fn load(&mut self, artifact: &Path) -> Result<()> {
        self.ensure_connected("restore")?;
        require_file(artifact)?;

        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "SQLite connection did not close cleanly");
            }
        }
        // The connection is reopened whether or not the replacement worked.
        let replaced = replace_database(artifact, &self.db_path);
        match open_db(self.db_path.clone()).await {
            Ok(conn) => self.conn = Some(conn),
            Err(e) => {
                replaced?;
                return Err(e);
            }
        }
        replaced?;

        tracing::info!(
            file = %artifact.display(),
            database = %self.db_path.display(),
            "✓ SQLite database replaced"
        );
        Ok(())
    }
}
