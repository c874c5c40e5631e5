//! Request and response types for the completion service.

use serde::{Deserialize, Serialize};

use tome_core::Message;

/// A named action the model may select instead of producing free text.
///
/// Used by the router to force a structured, machine-checkable choice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// One completion-service call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Optional system prompt, kept separate from the message list.
    pub system: Option<String>,
    /// Conversation history ending with the prompt to complete.
    pub messages: Vec<Message>,
    /// When non-empty, the model must pick exactly one of these tools.
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// A plain text-generation request.
    pub fn text(messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            system: None,
            messages,
            tools: Vec::new(),
            max_tokens,
        }
    }

    /// A forced-choice request over the given tools.
    pub fn choice(messages: Vec<Message>, tools: Vec<ToolSpec>, max_tokens: u32) -> Self {
        Self {
            system: None,
            messages,
            tools,
            max_tokens,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// True when this request forces a structured choice.
    pub fn is_choice(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// The result of one completion-service call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionOutput {
    /// Generated text.
    Text(String),
    /// The model selected one of the offered tools.
    ToolChoice { name: String },
}

impl CompletionOutput {
    /// Return the generated text, or `None` for a tool choice.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CompletionOutput::Text(t) => Some(t),
            CompletionOutput::ToolChoice { .. } => None,
        }
    }

    /// Return the chosen tool name, or `None` for plain text.
    pub fn as_choice(&self) -> Option<&str> {
        match self {
            CompletionOutput::ToolChoice { name } => Some(name),
            CompletionOutput::Text(_) => None,
        }
    }
}
