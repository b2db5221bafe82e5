//! CLI argument definitions for the brainbox binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use brainbox_core::actions::ActionStatus;
use brainbox_core::types::TenantId;

/// brainbox: capture a thought, let it be filed, and act on it.
#[derive(Parser, Debug)]
#[command(name = "brainbox", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Tenant to act for.
    #[arg(short = 't', long = "tenant", global = true)]
    pub tenant: Option<String>,

    /// Print results as JSON.
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Classify a piece of text and file it.
    Capture {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Move a capture into the right category and remember the correction.
    Fix { capture_id: Uuid, category: String },
    /// List recent captures.
    Captures {
        /// Only captures waiting for review.
        #[arg(long)]
        review: bool,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List recorded corrections.
    Corrections {
        /// Only corrections into this category.
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Review and run proposed actions.
    #[command(subcommand)]
    Actions(ActionsCommand),
    /// Manage workflows.
    #[command(subcommand)]
    Workflows(WorkflowsCommand),
    /// Show or change tenant settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Show token usage totals.
    Usage,
    /// Run the schedule loop until interrupted.
    Scheduler,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ActionsCommand {
    List {
        /// pending, approved, rejected, executing, executed or failed.
        #[arg(long)]
        status: Option<ActionStatus>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    Approve {
        id: Uuid,
        /// Recorded as the approver.
        #[arg(long = "by", default_value = "cli")]
        approver: String,
    },
    Reject {
        id: Uuid,
        #[arg(long, default_value = "Rejected from the command line")]
        reason: String,
    },
    /// Execute an approved action (or a pending one that needs no approval).
    Run { id: Uuid },
    /// Put the target back the way it was before the action ran.
    Restore { id: Uuid },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum WorkflowsCommand {
    /// Create a workflow from a .toml or .json definition.
    Add { file: PathBuf },
    List,
    Enable { id: Uuid },
    Disable { id: Uuid },
    Remove { id: Uuid },
    /// Run a schedule workflow now.
    Run { id: Uuid },
    /// Show the execution history of a workflow.
    History {
        id: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SettingsCommand {
    Show,
    /// Set one value, e.g. `confidence_threshold 0.8` or
    /// `categories.projects.defaults.status active`.
    Set { key: String, value: String },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > BRAINBOX_CONFIG env var > ~/.brainbox/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("BRAINBOX_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config_dir: &str) -> String {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| config_dir.to_string())
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Priority: --tenant flag > config file default.
    pub fn resolve_tenant(&self, default_tenant: &str) -> TenantId {
        match self.tenant.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => TenantId::new(t),
            _ => TenantId::new(default_tenant),
        }
    }
}

fn default_config_path() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".brainbox").join("config.toml"),
        Err(_) => PathBuf::from("config.toml"),
    }
}
