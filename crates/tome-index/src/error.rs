//! Error types for the embedding index.

use tome_core::TomeError;

/// Errors from the embedding index and knowledge base.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("cannot embed empty text")]
    EmptyText,
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl From<rusqlite::Error> for IndexError {
    fn from(err: rusqlite::Error) -> Self {
        IndexError::Storage(err.to_string())
    }
}

impl From<IndexError> for TomeError {
    fn from(err: IndexError) -> Self {
        TomeError::Index(err.to_string())
    }
}
