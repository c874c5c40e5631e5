//! Scripted completion service for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::CompletionError;
use crate::service::CompletionService;
use crate::types::{CompletionOutput, CompletionRequest};

/// One scripted step: either an output or a failure message.
enum Scripted {
    Output(CompletionOutput),
    Failure(String),
}

/// Completion service that replays a scripted FIFO of outputs.
///
/// Every request is logged so tests can assert which calls were made (and,
/// just as importantly, which were not). When the script runs dry the
/// default text is served, so long pipelines don't need a fully enumerated
/// script unless they care about individual steps.
pub struct MockCompletion {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
    log: Mutex<Vec<CompletionRequest>>,
    default_text: Option<String>,
}

impl MockCompletion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            default_text: None,
        }
    }

    /// Serve this text whenever the script is empty.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = Some(text.into());
        self
    }

    /// Queue a text output.
    pub fn push_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Output(CompletionOutput::Text(text.into())));
    }

    /// Queue a tool choice.
    pub fn push_tool_choice(&self, name: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Output(CompletionOutput::ToolChoice {
                name: name.into(),
            }));
    }

    /// Queue a failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Failure(message.into()));
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl CompletionService for MockCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionOutput, CompletionError> {
        self.log.lock().unwrap().push(request);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Output(out)) => Ok(out),
            Some(Scripted::Failure(msg)) => Err(CompletionError::Api {
                status: 500,
                message: msg,
            }),
            None => match &self.default_text {
                Some(text) => Ok(CompletionOutput::Text(text.clone())),
                None => Err(CompletionError::InvalidResponse(format!(
                    "mock '{}' script exhausted",
                    self.name
                ))),
            },
        }
    }

    fn model(&self) -> &str {
        &self.name
    }
}
