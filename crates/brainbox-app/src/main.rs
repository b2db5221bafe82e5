//! brainbox binary - composition root.
//!
//! 1. Parse the command line and load configuration from TOML
//! 2. Initialise tracing
//! 3. Open the SQLite database in the data directory
//! 4. Compose classification, action and workflow services
//! 5. Run the requested subcommand

mod app;
mod cli;
mod commands;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use brainbox_core::config::BrainboxConfig;
use brainbox_storage::Database;

use crate::app::{provider_or_unconfigured, Services};
use crate::cli::CliArgs;
use crate::commands::Output;

/// Expand `~` to the home directory in a path string.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(path),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the configured level applies.
    let config_file = args.resolve_config_path();
    let config_exists = config_file.exists();
    let config = if config_exists {
        BrainboxConfig::load(&config_file)?
    } else {
        BrainboxConfig::default()
    };

    // Tracing: RUST_LOG > --log-level > config.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        path = %config_file.display(),
        found = config_exists,
        "Configuration resolved"
    );

    // Storage.
    let data_dir = expand_home(&args.resolve_data_dir(&config.general.data_dir));
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("brainbox.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::debug!(path = %db_path.display(), "SQLite database opened");

    // Services.
    let provider = provider_or_unconfigured(&config.provider);
    let services = Services::build(&config, db, provider)?;
    let tenant = args.resolve_tenant(&config.general.default_tenant);
    let out = Output { json: args.json };

    match commands::run(&services, &config, &tenant, args.command, &out).await {
        Ok(text) => {
            if !text.is_empty() {
                println!("{}", text);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(tenant_id = %tenant, error = %e, "Command failed");
            Err(e)
        }
    }
}
