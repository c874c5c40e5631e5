//! Turn state with validated stage transitions.
//!
//! A turn moves through a fixed linear order of stages; the only fork is the
//! router's two-way choice between the query path and the exploration path.
//! The state is fully serializable so the one suspension point (awaiting
//! human confirmation) survives process boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tome_core::{Fragment, Message};

use crate::error::PipelineError;

/// Pipeline position of a turn.
///
/// Query path: Routing -> Decomposing -> AwaitingConfirmation -> Retrieving
/// -> Synthesizing -> Done. Exploration path: Routing -> Sampling ->
/// Clustering -> Mapping -> Reducing -> Done. Any active stage may fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Routing,
    Decomposing,
    AwaitingConfirmation,
    Retrieving,
    Synthesizing,
    Sampling,
    Clustering,
    Mapping,
    Reducing,
    Done,
    Failed,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Routing => "routing",
            TurnStage::Decomposing => "decomposing",
            TurnStage::AwaitingConfirmation => "awaiting_confirmation",
            TurnStage::Retrieving => "retrieving",
            TurnStage::Synthesizing => "synthesizing",
            TurnStage::Sampling => "sampling",
            TurnStage::Clustering => "clustering",
            TurnStage::Mapping => "mapping",
            TurnStage::Reducing => "reducing",
            TurnStage::Done => "done",
            TurnStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that a stage transition is allowed.
pub fn validate_transition(from: TurnStage, to: TurnStage) -> Result<(), PipelineError> {
    use TurnStage::*;

    let valid = matches!(
        (from, to),
        (Routing, Decomposing)
            | (Routing, Sampling)
            | (Decomposing, AwaitingConfirmation)
            | (AwaitingConfirmation, Retrieving)
            | (Retrieving, Synthesizing)
            | (Synthesizing, Done)
            | (Sampling, Clustering)
            | (Clustering, Mapping)
            | (Mapping, Reducing)
            | (Reducing, Done)
    ) || (to == Failed && !matches!(from, Done | Failed));

    if valid {
        Ok(())
    } else {
        Err(PipelineError::InvalidTransition(from, to))
    }
}

/// The structured decision that resumes a suspended turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanDecision {
    /// Run retrieval with the sub-queries as presented.
    Approve,
    /// Replace the sub-queries entirely before retrieval.
    Revise(Vec<String>),
}

/// Retrieval results associated back to their originating sub-query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubQueryHits {
    pub subquery: String,
    pub fragments: Vec<Fragment>,
}

/// One successful cluster summary, keyed by its cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub summary: String,
}

/// Mutable record threaded through one turn of the pipeline.
///
/// Owned exclusively by the active invocation; the map stage produces
/// independent partial results that are merged back here by reduce.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnState {
    pub id: Uuid,
    /// Name of the knowledge base this turn is bound to. A turn never mixes
    /// fragments from two knowledge bases.
    pub kb_name: String,
    /// Generation of the knowledge base at turn start; a recreate while the
    /// turn is suspended invalidates it.
    pub kb_generation: u64,
    pub stage: TurnStage,
    /// Snapshot of the conversation history at turn start.
    pub messages: Vec<Message>,
    pub user_query: String,
    pub subqueries: Vec<String>,
    pub retrieved: Vec<SubQueryHits>,
    pub cluster_summaries: Vec<ClusterSummary>,
    pub failed_clusters: usize,
    pub output: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Set when the turn parks at the human-confirmation step.
    pub suspended_at: Option<DateTime<Utc>>,
}

impl TurnState {
    pub fn new(
        kb_name: impl Into<String>,
        kb_generation: u64,
        messages: Vec<Message>,
        user_query: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kb_name: kb_name.into(),
            kb_generation,
            stage: TurnStage::Routing,
            messages,
            user_query: user_query.into(),
            subqueries: Vec::new(),
            retrieved: Vec::new(),
            cluster_summaries: Vec::new(),
            failed_clusters: 0,
            output: None,
            started_at: Utc::now(),
            suspended_at: None,
        }
    }

    /// Move to the next stage, validating the transition.
    pub fn advance(&mut self, to: TurnStage) -> Result<(), PipelineError> {
        validate_transition(self.stage, to)?;
        self.stage = to;
        Ok(())
    }

    /// Serialize for checkpointing across a process boundary.
    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string(self)
            .map_err(|e| PipelineError::KnowledgeBase(format!("checkpoint serialize: {}", e)))
    }

    /// Restore a checkpointed turn.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::KnowledgeBase(format!("checkpoint parse: {}", e)))
    }

    /// Every distinct retrieved fragment, first occurrence wins, in
    /// sub-query order.
    pub fn unique_fragments(&self) -> Vec<&Fragment> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for hits in &self.retrieved {
            for fragment in &hits.fragments {
                if seen.insert(fragment.id) {
                    out.push(fragment);
                }
            }
        }
        out
    }
}
