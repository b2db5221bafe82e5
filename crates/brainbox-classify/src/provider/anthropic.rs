//! Anthropic Messages API provider.

use std::time::Duration;

use async_trait::async_trait;

use brainbox_core::types::TokenUsage;

use super::http;
use super::{Generation, Prompt, TextGenerator};
use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    agent: ureq::Agent,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: http::agent(timeout),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens,
            timeout,
        }
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": prompt.system,
            "messages": [{"role": "user", "content": prompt.user}],
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let headers = vec![
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ("content-type", "application/json".to_string()),
        ];
        let json = http::post_json(
            self.agent.clone(),
            url,
            headers,
            self.request_body(prompt),
            self.timeout.as_secs(),
        )
        .await?;
        parse_response(&json, &self.model)
    }
}

/// Extract the first text block and the usage counters.
fn parse_response(json: &serde_json::Value, model: &str) -> Result<Generation, ProviderError> {
    let text = json["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
        .ok_or_else(|| {
            ProviderError::Malformed("No text content in Anthropic response".to_string())
        })?;

    Ok(Generation {
        text: text.to_string(),
        usage: TokenUsage {
            provider: "anthropic".to_string(),
            model: json["model"].as_str().unwrap_or(model).to_string(),
            input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0),
        },
    })
}
