//! Error types for classification and capture routing.

use brainbox_core::error::BrainboxError;
use uuid::Uuid;

/// Failures of the external text-generation call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider call timed out after {0} seconds")]
    Timeout(u64),
    #[error("Transient provider failure: {0}")]
    Transient(String),
    #[error("Provider rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout(_) | ProviderError::Transient(_))
    }
}

/// Errors from classifying and routing a capture.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Could not parse classifier output: {0}")]
    Parse(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Capture not found: {0}")]
    NotFound(Uuid),
    #[error("Storage error: {0}")]
    Storage(#[from] BrainboxError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_and_transients_retry() {
        assert!(ProviderError::Timeout(30).is_retryable());
        assert!(ProviderError::Transient("503".into()).is_retryable());
        assert!(!ProviderError::Rejected {
            status: 401,
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!ProviderError::Unavailable("no key".into()).is_retryable());
        assert!(!ProviderError::Malformed("no content".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProviderError::Timeout(30).to_string(),
            "Provider call timed out after 30 seconds"
        );
        assert_eq!(
            ProviderError::Rejected {
                status: 400,
                message: "bad".into()
            }
            .to_string(),
            "Provider rejected the request (HTTP 400): bad"
        );
        let err: ClassifyError = ProviderError::Timeout(5).into();
        assert_eq!(err.to_string(), "Provider call timed out after 5 seconds");
        assert_eq!(
            ClassifyError::Parse("expected value".into()).to_string(),
            "Could not parse classifier output: expected value"
        );
    }

    #[test]
    fn test_classify_error_from_brainbox_error() {
        let err: ClassifyError = BrainboxError::Storage("locked".into()).into();
        assert!(matches!(err, ClassifyError::Storage(_)));
        assert!(err.to_string().contains("locked"));
    }
}
