//! Bounded retry with exponential backoff and a per-attempt timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use brainbox_core::config::ProviderConfig;

use super::{Generation, Prompt, TextGenerator};
use crate::error::ProviderError;

/// Upper bound on configured attempts.
pub const MAX_ATTEMPTS: u32 = 10;
/// Upper bound on any single wait between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Each attempt is abandoned after this long.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.clamp(1, MAX_ATTEMPTS),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms).min(MAX_BACKOFF),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

/// Wraps any [`TextGenerator`] with the retry policy.
///
/// Only retryable errors (timeouts, transient failures) are retried; the
/// last error surfaces once attempts are exhausted. There is no fallback.
pub struct RetryingGenerator {
    inner: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        match tokio::time::timeout(self.policy.timeout, self.inner.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.policy.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl TextGenerator for RetryingGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.attempt(prompt).await {
                Ok(generation) => {
                    if attempt > 1 {
                        debug!(attempt, provider = self.name(), "Provider call succeeded after retry");
                    }
                    return Ok(generation);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retryable provider error"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn next_backoff(backoff: Duration) -> Duration {
    backoff.saturating_mul(2).min(MAX_BACKOFF)
}
