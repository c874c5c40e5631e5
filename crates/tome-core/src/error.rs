use thiserror::Error;

/// Top-level error type for the tome system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for TomeError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TomeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for TomeError {
    fn from(err: toml::de::Error) -> Self {
        TomeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TomeError {
    fn from(err: toml::ser::Error) -> Self {
        TomeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TomeError {
    fn from(err: serde_json::Error) -> Self {
        TomeError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for tome operations.
pub type Result<T> = std::result::Result<T, TomeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TomeError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TomeError = io_err.into();
        assert!(matches!(err, TomeError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let parsed: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        assert!(parsed.is_err());
        let err: TomeError = parsed.unwrap_err().into();
        assert!(matches!(err, TomeError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        assert!(parsed.is_err());
        let err: TomeError = parsed.unwrap_err().into();
        assert!(matches!(err, TomeError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(TomeError, &str)> = vec![
            (
                TomeError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                TomeError::Completion("model refused".to_string()),
                "Completion error: model refused",
            ),
            (
                TomeError::Index("collection missing".to_string()),
                "Index error: collection missing",
            ),
            (
                TomeError::Parse("bad encoding".to_string()),
                "Parse error: bad encoding",
            ),
            (
                TomeError::Pipeline("no route".to_string()),
                "Pipeline error: no route",
            ),
            (
                TomeError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }
}
