//! Completion service trait and the primary+fallback composition.

use std::sync::Arc;

use tracing::warn;

use crate::error::CompletionError;
use crate::types::{CompletionOutput, CompletionRequest};

/// Service for generating text or structured choices from a language model.
///
/// Implementations are the only place the system talks to a model; every
/// pipeline stage goes through this trait so tests can substitute a script.
pub trait CompletionService: Send + Sync {
    /// Run one completion call.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionOutput, CompletionError>> + Send;

    /// Name of the model answering requests, for logging.
    fn model(&self) -> &str;
}

/// Object-safe version of [`CompletionService`] for dynamic dispatch.
///
/// Because `CompletionService::complete` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Arc<dyn DynCompletionService>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `CompletionService`
/// automatically implements `DynCompletionService`.
pub trait DynCompletionService: Send + Sync {
    /// Run one completion call (boxed future).
    fn complete_boxed(
        &self,
        request: CompletionRequest,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<CompletionOutput, CompletionError>> + Send + '_>,
    >;

    /// Name of the model answering requests, for logging.
    fn model(&self) -> &str;
}

/// Blanket impl: any `CompletionService` automatically implements `DynCompletionService`.
impl<T: CompletionService> DynCompletionService for T {
    fn complete_boxed(
        &self,
        request: CompletionRequest,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<CompletionOutput, CompletionError>> + Send + '_>,
    > {
        Box::pin(self.complete(request))
    }

    fn model(&self) -> &str {
        CompletionService::model(self)
    }
}

/// A shared handle to a completion service.
pub type SharedCompletion = Arc<dyn DynCompletionService>;

/// Primary+fallback composition.
///
/// The fallback is invoked transparently when the primary fails. Components
/// that must not fall back (the synthesis step) hold the primary service
/// directly instead of this wrapper.
pub struct FallbackCompletion {
    primary: SharedCompletion,
    fallback: SharedCompletion,
}

impl FallbackCompletion {
    pub fn new(primary: SharedCompletion, fallback: SharedCompletion) -> Self {
        Self { primary, fallback }
    }
}

impl CompletionService for FallbackCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionOutput, CompletionError> {
        match self.primary.complete_boxed(request.clone()).await {
            Ok(output) => Ok(output),
            Err(primary_err) => {
                warn!(
                    primary = self.primary.model(),
                    fallback = self.fallback.model(),
                    error = %primary_err,
                    "Primary completion failed, trying fallback"
                );
                self.fallback
                    .complete_boxed(request)
                    .await
                    .map_err(|fallback_err| {
                        CompletionError::Exhausted(format!(
                            "primary: {}; fallback: {}",
                            primary_err, fallback_err
                        ))
                    })
            }
        }
    }

    fn model(&self) -> &str {
        self.primary.model()
    }
}
