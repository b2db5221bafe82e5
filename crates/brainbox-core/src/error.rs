use thiserror::Error;

/// Top-level error type for brainbox.
///
/// Subsystem crates define their own error enums and wrap this one with
/// `#[from]` so that `?` works across crate boundaries. `Storage` is the
/// persistence failure of the error taxonomy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BrainboxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for BrainboxError {
    fn from(err: toml::de::Error) -> Self {
        BrainboxError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BrainboxError {
    fn from(err: toml::ser::Error) -> Self {
        BrainboxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BrainboxError {
    fn from(err: serde_json::Error) -> Self {
        BrainboxError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for brainbox operations.
pub type Result<T> = std::result::Result<T, BrainboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(BrainboxError, &str)> = vec![
            (
                BrainboxError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                BrainboxError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                BrainboxError::Validation("unknown category".to_string()),
                "Validation error: unknown category",
            ),
            (
                BrainboxError::Serialization("eof".to_string()),
                "Serialization error: eof",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BrainboxError = io_err.into();
        assert!(matches!(err, BrainboxError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: BrainboxError = json_err.into();
        assert!(matches!(err, BrainboxError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: BrainboxError = toml_err.into();
        assert!(matches!(err, BrainboxError::Config(_)));
    }
}
