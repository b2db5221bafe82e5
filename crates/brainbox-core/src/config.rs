use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BrainboxError, Result};
use crate::types::Fields;

/// Top-level configuration for brainbox.
///
/// Loaded from `~/.brainbox/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainboxConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub tenant_defaults: TenantSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl BrainboxConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrainboxConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BrainboxError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Tenant used by the CLI when `--tenant` is not given.
    pub default_tenant: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.brainbox/data".to_string(),
            log_level: "info".to_string(),
            default_tenant: "default".to_string(),
        }
    }
}

/// Which text-generation backend to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    Openai,
}

/// Text-generation provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override for the API base URL (proxies, compatible gateways).
    pub base_url: Option<String>,
    pub max_tokens: u32,
    /// Per-call timeout; the call is abandoned once it runs this long.
    pub timeout_secs: u64,
    /// Total attempts for transient failures, including the first. Clamped
    /// to 1..=10.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry, capped
    /// at one minute.
    pub initial_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Anthropic,
            model: "claude-3-5-haiku-latest".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            max_tokens: 1024,
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

/// Capture routing heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Inputs shorter than this many characters (trimmed) are ambiguous.
    pub min_length: usize,
    /// Whole-input greetings treated as ambiguous (case-insensitive).
    pub greetings: Vec<String>,
    /// Phrases in the classifier's reasoning that signal ambiguity.
    pub hedge_phrases: Vec<String>,
    /// Message returned to the user when a capture needs review.
    pub needs_review_message: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_length: 4,
            greetings: ["hi", "hello", "hey", "yo", "thanks", "thank you", "ok", "okay", "test"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hedge_phrases: ["unclear", "ambiguous", "greeting", "too vague"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            needs_review_message: "I couldn't tell where this belongs, so it is waiting for \
                review. Try adding a bit more detail, e.g. a name, a project, or what needs \
                to happen next."
                .to_string(),
        }
    }
}

/// Few-shot learning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    pub enabled: bool,
    /// Maximum corrections included in the prompt.
    pub max_examples: u32,
    /// Only corrections newer than this many days are used.
    pub days_back: u32,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_examples: 5,
            days_back: 30,
        }
    }
}

/// Per-category settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySettings {
    pub enabled: bool,
    /// Values applied to fields the classifier left unset.
    pub defaults: Fields,
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            defaults: Fields::new(),
        }
    }
}

impl CategorySettings {
    fn with_default(key: &str, value: &str) -> Self {
        let mut defaults = Fields::new();
        defaults.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        Self {
            enabled: true,
            defaults,
        }
    }
}

/// Settings that can differ per tenant.
///
/// Stored per tenant in the database; `tenant_defaults` in the config file
/// applies to tenants that have never saved their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantSettings {
    /// Captures at or above this confidence are filed.
    pub confidence_threshold: f64,
    pub learning: LearningSettings,
    pub categories: BTreeMap<String, CategorySettings>,
}

impl Default for TenantSettings {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert("people".to_string(), CategorySettings::default());
        categories.insert(
            "projects".to_string(),
            CategorySettings::with_default("status", "active"),
        );
        categories.insert("ideas".to_string(), CategorySettings::default());
        categories.insert(
            "admin".to_string(),
            CategorySettings::with_default("status", "todo"),
        );
        Self {
            confidence_threshold: 0.6,
            learning: LearningSettings::default(),
            categories,
        }
    }
}

impl TenantSettings {
    /// Names of the categories currently enabled.
    pub fn enabled_categories(&self) -> BTreeSet<String> {
        self.categories
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        self.categories.get(category).is_some_and(|c| c.enabled)
    }

    /// Default field values for a category (empty when none are configured).
    pub fn defaults_for(&self, category: &str) -> Fields {
        self.categories
            .get(category)
            .map(|c| c.defaults.clone())
            .unwrap_or_default()
    }
}

/// Schedule tick loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between wall-clock checks. Ticks fire once per new minute.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 20,
        }
    }
}
