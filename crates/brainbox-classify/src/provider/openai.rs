//! OpenAI-compatible chat completions provider.

use std::time::Duration;

use async_trait::async_trait;

use brainbox_core::types::TokenUsage;

use super::http;
use super::{Generation, Prompt, TextGenerator};
use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    agent: ureq::Agent,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiProvider {
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
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let headers = vec![
            ("authorization", format!("Bearer {}", self.api_key)),
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

fn parse_response(json: &serde_json::Value, model: &str) -> Result<Generation, ProviderError> {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ProviderError::Malformed("No message content in completion".to_string()))?;

    Ok(Generation {
        text: text.to_string(),
        usage: TokenUsage {
            provider: "openai".to_string(),
            model: json["model"].as_str().unwrap_or(model).to_string(),
            input_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_completion() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "{}"}}],
            "usage": {"prompt_tokens": 50, "completion_tokens": 5}
        });
        let generation = parse_response(&body, "gpt-test").unwrap();
        assert_eq!(generation.text, "{}");
        assert_eq!(generation.usage.provider, "openai");
        assert_eq!(generation.usage.model, "gpt-test");
        assert_eq!(generation.usage.total(), 55);
    }

    #[test]
    fn test_parse_completion_without_choices_is_malformed() {
        let err = parse_response(&json!({"choices": []}), "m").unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn test_request_body_uses_system_message() {
        let provider = OpenAiProvider::new(
            "key".into(),
            "gpt-test".into(),
            Some("http://localhost:8080/".into()),
            128,
            Duration::from_secs(5),
        );
        let body = provider.request_body(&Prompt {
            system: "sys".into(),
            user: "hello".into(),
        });
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(provider.base_url, "http://localhost:8080/");
    }
}
