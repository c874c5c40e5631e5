//! Completion service for tome.
//!
//! Everything that talks to a language model goes through
//! [`CompletionService`]: the HTTP client for production, the scripted mock
//! for tests, and the primary+fallback composition used by pipeline stages
//! that are allowed to fail over.

pub mod error;
pub mod http;
pub mod mock;
pub mod service;
pub mod types;

pub use error::CompletionError;
pub use http::HttpCompletion;
pub use mock::MockCompletion;
pub use service::{CompletionService, DynCompletionService, FallbackCompletion, SharedCompletion};
pub use types::{CompletionOutput, CompletionRequest, ToolSpec};
