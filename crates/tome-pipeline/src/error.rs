//! Error taxonomy for the orchestration pipeline.
//!
//! Failures with a configured fallback (completion fallback) are recovered
//! inside `tome-llm` and never reach this type. Everything else propagates
//! to the turn boundary, where the caller gets one human-readable message
//! plus a machine-readable kind for logging.

use uuid::Uuid;

use tome_core::TomeError;
use tome_llm::CompletionError;
use tome_parse::ParseError;

use crate::state::TurnStage;

/// Errors that abort a turn.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("routing failure: {0}")]
    Routing(String),
    #[error("completion failure: {0}")]
    Completion(#[from] CompletionError),
    #[error("synthesis failure: {0}")]
    Synthesis(String),
    #[error("retrieval failure: {0}")]
    Retrieval(String),
    #[error("all {0} cluster summaries failed")]
    ClusterSummaries(usize),
    #[error("knowledge base failure: {0}")]
    KnowledgeBase(String),
    #[error("knowledge base is empty")]
    EmptyKnowledgeBase,
    #[error("confirmation wait exceeded {0} seconds")]
    SuspendedTimeout(u64),
    #[error("no suspended turn with handle {0}")]
    UnknownTurn(Uuid),
    #[error("invalid human decision: {0}")]
    InvalidDecision(String),
    #[error("message cannot be empty")]
    EmptyQuery,
    #[error("invalid stage transition from {0} to {1}")]
    InvalidTransition(TurnStage, TurnStage),
    #[error("parse failure: {0}")]
    Parse(#[from] ParseError),
}

impl PipelineError {
    /// Machine-readable error kind for logging and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Routing(_) => "routing_failure",
            PipelineError::Completion(_) => "completion_failure",
            PipelineError::Synthesis(_) => "synthesis_failure",
            PipelineError::Retrieval(_) => "retrieval_failure",
            PipelineError::ClusterSummaries(_) => "cluster_summary_failure",
            PipelineError::KnowledgeBase(_) => "knowledge_base_failure",
            PipelineError::EmptyKnowledgeBase => "empty_knowledge_base",
            PipelineError::SuspendedTimeout(_) => "suspended_timeout",
            PipelineError::UnknownTurn(_) => "unknown_turn",
            PipelineError::InvalidDecision(_) => "invalid_decision",
            PipelineError::EmptyQuery => "empty_query",
            PipelineError::InvalidTransition(_, _) => "invalid_transition",
            PipelineError::Parse(_) => "parse_failure",
        }
    }
}

impl From<PipelineError> for TomeError {
    fn from(err: PipelineError) -> Self {
        TomeError::Pipeline(err.to_string())
    }
}
