//! Text-generation providers.
//!
//! [`TextGenerator`] is the capability the classifier depends on. The
//! concrete backend is chosen once, from configuration, by
//! [`build_provider`]; call sites never branch on the provider kind.

mod anthropic;
mod http;
mod openai;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use brainbox_core::config::{ProviderConfig, ProviderKind};
use brainbox_core::types::TokenUsage;

use crate::error::ProviderError;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use retry::{RetryPolicy, RetryingGenerator};

/// A prompt split into system instructions and the user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Flattened form stored in the audit log.
    pub fn render(&self) -> String {
        format!("[system]\n{}\n\n[user]\n{}", self.system, self.user)
    }
}

/// Text returned by a provider plus what the call cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name recorded in audit and usage rows.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError>;
}

/// Stand-in used when no provider could be built. Every call fails as
/// unavailable, so commands that never classify still work.
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn model(&self) -> &str {
        "none"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<Generation, ProviderError> {
        Err(ProviderError::Unavailable(self.reason.clone()))
    }
}

/// Construct the configured provider wrapped in the retry/timeout policy.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn TextGenerator>, ProviderError> {
    let api_key = std::env::var(&config.api_key_env).map_err(|_| {
        ProviderError::Unavailable(format!(
            "{} environment variable is not set",
            config.api_key_env
        ))
    })?;
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    let inner: Arc<dyn TextGenerator> = match config.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.max_tokens,
            timeout,
        )),
        ProviderKind::Openai => Arc::new(OpenAiProvider::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.max_tokens,
            timeout,
        )),
    };

    tracing::info!(provider = inner.name(), model = inner.model(), "Text generation provider ready");
    Ok(Arc::new(RetryingGenerator::new(
        inner,
        RetryPolicy::from_config(config),
    )))
}
