//! Error types for the completion service.

use tome_core::TomeError;

/// Errors from completion-service calls.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Http(String),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("primary and fallback both failed: {0}")]
    Exhausted(String),
}

impl From<CompletionError> for TomeError {
    fn from(err: CompletionError) -> Self {
        TomeError::Completion(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_display() {
        let err = CompletionError::Http("connection refused".to_string());
        assert_eq!(err.to_string(), "transport error: connection refused");

        let err = CompletionError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "API error (status 429): rate limited");

        let err = CompletionError::InvalidResponse("no content".to_string());
        assert_eq!(err.to_string(), "invalid response: no content");

        let err = CompletionError::Exhausted("overloaded".to_string());
        assert_eq!(
            err.to_string(),
            "primary and fallback both failed: overloaded"
        );
    }

    #[test]
    fn test_conversion_to_tome_error() {
        let err: TomeError = CompletionError::Http("timeout".to_string()).into();
        assert!(matches!(err, TomeError::Completion(_)));
        assert!(err.to_string().contains("timeout"));
    }
}
