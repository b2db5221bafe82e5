//! Blocking HTTP plumbing shared by the providers.
//!
//! `ureq` is synchronous, so requests run on tokio's blocking pool.

use std::time::Duration;

use crate::error::ProviderError;

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// POST a JSON body and read a JSON response off the async runtime.
pub(crate) async fn post_json(
    agent: ureq::Agent,
    url: String,
    headers: Vec<(&'static str, String)>,
    body: serde_json::Value,
    timeout_secs: u64,
) -> Result<serde_json::Value, ProviderError> {
    tokio::task::spawn_blocking(move || {
        let mut request = agent.post(&url);
        for (name, value) in &headers {
            request = request.header(*name, value.as_str());
        }
        let response = request
            .send_json(&body)
            .map_err(|e| map_ureq_error(e, timeout_secs))?;
        response
            .into_body()
            .read_json::<serde_json::Value>()
            .map_err(|e| ProviderError::Malformed(format!("Response is not JSON: {}", e)))
    })
    .await
    .map_err(|e| ProviderError::Transient(format!("Task join error: {}", e)))?
}

/// Retryable: rate limits, server errors, timeouts, connection failures.
pub(crate) fn map_ureq_error(err: ureq::Error, timeout_secs: u64) -> ProviderError {
    match err {
        ureq::Error::StatusCode(status) => status_error(status),
        ureq::Error::Timeout(_) => ProviderError::Timeout(timeout_secs),
        ureq::Error::Io(e) => ProviderError::Transient(e.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            ProviderError::Transient(err.to_string())
        }
        other => ProviderError::Unavailable(other.to_string()),
    }
}

pub(crate) fn status_error(status: u16) -> ProviderError {
    if matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529) {
        ProviderError::Transient(format!("HTTP {}", status))
    } else {
        ProviderError::Rejected {
            status,
            message: format!("HTTP {}", status),
        }
    }
}
