mod logic;

pub use logic::perform_restore;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::backup::encryption::{Cipher, ENCRYPTED_SUFFIX};
use crate::config::{AppConfig, CloudProvider, OperationConfig};
use crate::database::{Session, create_handler};
use crate::errors::BackupError;
use crate::storage::s3::download_file_from_s3;
use crate::utils::{Toolchain, has_suffix};

/// Public entry point for the restore process.
pub async fn run_restore_flow(app_config: &AppConfig) -> Result<()> {
    let restore_config = match &app_config.operation {
        Some(OperationConfig::Restore(cfg)) => cfg,
        _ => anyhow::bail!("Restore operation selected but no restore configuration found."),
    };

    // Downloads land in a scratch directory that is removed afterwards.
    let (backup_path, _download_dir) = if restore_config.backup_source.starts_with("s3://") {
        let aws = app_config
            .aws
            .as_ref()
            .ok_or(BackupError::CredentialsMissing(CloudProvider::Aws))?;
        std::fs::create_dir_all(&app_config.work_dir).with_context(|| {
            format!("Failed to create work directory {}", app_config.work_dir.display())
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(&app_config.work_dir)
            .context("Failed to create download directory")?;
        let path = download_file_from_s3(aws, &restore_config.backup_source, scratch.path())
            .await
            .context("Failed to download backup from S3")?;
        (path, Some(scratch))
    } else {
        (PathBuf::from(&restore_config.backup_source), None)
    };
    // Checked before any connection is attempted.
    if !backup_path.exists() {
        return Err(BackupError::ArtifactMissing(backup_path).into());
    }

    let cipher = if has_suffix(&backup_path, ENCRYPTED_SUFFIX) {
        Some(Cipher::from_config(app_config).context("The backup is encrypted")?)
    } else {
        None
    };

    let toolchain = Toolchain::new(app_config.tools_dir.as_deref());
    let handler = create_handler(
        restore_config.kind,
        restore_config.connection.clone(),
        toolchain,
    )?;
    let mut session = Session::open(handler)
        .await
        .with_context(|| format!("Failed to connect to the {} database", restore_config.kind))?;

    perform_restore(session.handler_mut(), &backup_path, cipher.as_ref())
        .await
        .with_context(|| format!("Restore from {} failed", backup_path.display()))?;
    tracing::info!(source = %restore_config.backup_source, "✅ restore completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, DbKind, RestoreConfig};

    fn app_config(operation: OperationConfig, work_dir: PathBuf) -> AppConfig {
        AppConfig {
            operation: Some(operation),
            encryption_key: None,
            tools_dir: None,
            work_dir,
            slack_webhook_url: None,
            aws: None,
            gcp: None,
            azure: None,
        }
    }

    #[tokio::test]
    async fn test_missing_backup_is_rejected_before_connecting() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let missing = work.path().join("shop.sql.gz");
        // Nothing listens on port 1, so a connection attempt would fail differently.
        let config = app_config(
            OperationConfig::Restore(RestoreConfig {
                kind: DbKind::Postgres,
                connection: ConnectionConfig {
                    host: Some("127.0.0.1".to_string()),
                    port: Some(1),
                    database: Some("shop".to_string()),
                    ..Default::default()
                },
                backup_source: missing.display().to_string(),
            }),
            work.path().to_path_buf(),
        );

        let err = run_restore_flow(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackupError>(),
            Some(BackupError::ArtifactMissing(path)) if *path == missing
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_s3_source_needs_aws_credentials() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let config = app_config(
            OperationConfig::Restore(RestoreConfig {
                kind: DbKind::Mongo,
                connection: ConnectionConfig::default(),
                backup_source: "s3://nightly/blogDB.tar.gz.enc".to_string(),
            }),
            work.path().to_path_buf(),
        );

        let err = run_restore_flow(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackupError>(),
            Some(BackupError::CredentialsMissing(CloudProvider::Aws))
        ));
        Ok(())
    }
}
