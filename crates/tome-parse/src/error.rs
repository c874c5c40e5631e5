//! Error types for document parsing.

use tome_core::TomeError;

/// Errors from the document parser.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

impl From<ParseError> for TomeError {
    fn from(err: ParseError) -> Self {
        TomeError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::UnsupportedFormat("report.docx".to_string());
        assert_eq!(err.to_string(), "unsupported document format: report.docx");
    }

    #[test]
    fn test_conversion_to_tome_error() {
        let err: TomeError = ParseError::UnsupportedFormat("x.bin".to_string()).into();
        assert!(matches!(err, TomeError::Parse(_)));
    }
}
