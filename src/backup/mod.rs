pub mod archive;
pub mod encryption;
mod logic;

pub use logic::perform_backup;

use std::fmt;

use anyhow::{Context, Result};

use crate::config::{AppConfig, OperationConfig};
use crate::database::{Session, create_handler};
use crate::notify::{Notifier, WebhookNotifier};
use crate::storage;
use crate::utils::Toolchain;
use encryption::Cipher;

/// Steps of the backup pipeline that can fail, in execution order.
/// Notification is best-effort and never fails a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dump,
    Compress,
    Encrypt,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dump => "dump",
            Stage::Compress => "compress",
            Stage::Encrypt => "encrypt",
            Stage::Store => "store",
        };
        f.write_str(name)
    }
}

/// Public entry point for the backup process.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<()> {
    let backup_config = match &app_config.operation {
        Some(OperationConfig::Backup(cfg)) => cfg,
        _ => anyhow::bail!("Backup operation selected but no backup configuration found."),
    };

    // Everything that can be rejected up front is checked before the dump runs.
    let cipher = if backup_config.options.encrypt {
        Some(Cipher::from_config(app_config).context("Encryption was requested")?)
    } else {
        None
    };
    let store = storage::for_target(&backup_config.target, app_config)
        .context("Failed to prepare backup storage")?;

    let webhook_url = backup_config
        .options
        .webhook_url
        .clone()
        .or_else(|| app_config.slack_webhook_url.clone());
    let notifier = match (backup_config.options.notify, webhook_url) {
        (true, Some(url)) => Some(WebhookNotifier::new(url)),
        (true, None) => {
            tracing::warn!("notifications requested but no webhook URL is configured");
            None
        }
        (false, _) => None,
    };

    let toolchain = Toolchain::new(app_config.tools_dir.as_deref());
    let handler = create_handler(
        backup_config.kind,
        backup_config.connection.clone(),
        toolchain,
    )?;
    let mut session = Session::open(handler)
        .await
        .with_context(|| format!("Failed to connect to the {} database", backup_config.kind))?;

    let outcome = perform_backup(
        session.handler_mut(),
        backup_config,
        cipher.as_ref(),
        store.as_ref(),
        notifier.as_ref().map(|n| n as &dyn Notifier),
    )
    .await;

    match outcome {
        Ok(stored) => {
            tracing::info!(location = %stored, "✅ backup completed");
            Ok(())
        }
        Err(err) => {
            for path in err.retained_artifacts() {
                tracing::warn!(path = %path.display(), "artifact left on disk after failure");
            }
            Err(err).context("Backup process failed")
        }
    }
}
