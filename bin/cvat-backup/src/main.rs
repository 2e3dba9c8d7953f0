//! cvat-backup – entry point.
//!
//! Startup order:
//! 1. Parse the command line and layer configuration (file, env, flags).
//! 2. Initialise structured tracing (JSON or human-readable).
//! 3. Log in to CVAT.
//! 4. Run the incremental backup (or print the plan with `--dry-run`).
//!
//! Any error ends the process with a non-zero exit code and leaves the
//! watermark record untouched.

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use cvat_backup_core::{BackupOrchestrator, CvatClient};
use tracing::info;

use crate::cli::Cli;
use crate::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli)?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    init_tracing(&settings);
    info!(version = env!("CARGO_PKG_VERSION"), "cvat-backup starting");

    // ── 3. Login ───────────────────────────────────────────────────────────────
    let client = CvatClient::login(&settings.client_config())
        .await
        .with_context(|| format!("cannot log in to {}", settings.url))?;
    info!(url = %settings.url, user = %settings.user, "logged in");

    let backup = settings.backup_config();
    let mut orchestrator = BackupOrchestrator::new(client, backup.clone())?;
    info!(
        state_file = %backup.state_file.display(),
        known_tasks = orchestrator.store().len(),
        "watermark record loaded"
    );

    // ── 4. Backup ──────────────────────────────────────────────────────────────
    if cli.dry_run {
        let pending = orchestrator.plan().await?;
        for task in &pending {
            println!("{}[#{}]\t{}", task.name, task.id, task.updated_date);
        }
        info!(pending = pending.len(), "dry run, nothing downloaded");
        return Ok(());
    }

    std::fs::create_dir_all(&backup.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            backup.output_dir.display()
        )
    })?;

    let summary = orchestrator.run().await?;
    info!(
        downloaded = summary.downloaded,
        unchanged = summary.unchanged,
        files = summary.files.len(),
        "cvat-backup finished"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(settings: &Settings) {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match settings.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: log level '{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    settings.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    if settings.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
