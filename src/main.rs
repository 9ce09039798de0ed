//! Database Backup/Restore Tool
//!
//! Dumps MySQL, PostgreSQL, MongoDB and SQLite databases with their native
//! tools, optionally compresses and encrypts the result, and stores it
//! locally or in S3, Google Cloud Storage or Azure Blob Storage.

// dbbackup/src/main.rs
mod backup;
mod cli;
mod config;
mod database;
mod errors;
mod notify;
mod restore;
mod storage;
mod utils;

use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use backup::encryption::Cipher;
use cli::{Cli, Command};
use config::{AppConfig, OperationConfig};

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("❌ Error: {e:?}");
        return ExitCode::FAILURE;
    }

    match run_app(cli).await {
        Ok(()) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("❌ Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

/// Stderr output filtered by `RUST_LOG` (or `--verbose`), plus an optional
/// plain-text copy in `log_file`.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")
}

async fn run_app(cli: Cli) -> Result<()> {
    // keygen must work before any configuration exists
    if let Command::Keygen = cli.command {
        println!("{}", Cipher::generate_key());
        return Ok(());
    }

    let mut app_config = AppConfig::load(&cli.config).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            cli.config.display()
        )
    })?;

    match cli.command {
        Command::Backup(args) => {
            tracing::info!("🚀 Starting Backup Process...");
            let backup_config = args.into_config().context("Invalid backup options")?;
            app_config.operation = Some(OperationConfig::Backup(backup_config));
            backup::run_backup_flow(&app_config).await?;
        }
        Command::Restore(args) => {
            tracing::info!("🔄 Starting Restore Process...");
            app_config.operation = Some(OperationConfig::Restore(args.into()));
            restore::run_restore_flow(&app_config)
                .await
                .context("Restore process failed")?;
        }
        Command::TestConnection(args) => {
            tracing::info!("🔌 Testing database connection...");
            app_config.operation = Some(OperationConfig::TestConnection(args.into()));
            database::run_connection_test_flow(&app_config).await?;
        }
        Command::Schedule => {
            tracing::warn!(
                "Scheduling is not supported; run `dbbackup backup` from cron or a systemd timer instead."
            );
        }
        Command::Keygen => {}
    }
    Ok(())
}
