//! Orchestration core for tome.
//!
//! A turn enters through [`TomeEngine::start_turn`]: an optional
//! knowledge-base command runs first, then the router classifies the
//! utterance into the query path (decompose, human confirmation, retrieve,
//! synthesize) or the exploration path (sample, cluster, map, reduce). The
//! query path suspends at human confirmation and resumes through
//! [`TomeEngine::resume_turn`] with a structured decision.

pub mod cluster;
pub mod engine;
pub mod error;
pub mod explore;
pub mod prompts;
pub mod query;
pub mod router;
pub mod state;

pub use cluster::{cluster_fragments, Cluster, ClusterParams};
pub use engine::{
    DocumentUpload, EngineServices, TomeEngine, TurnOutcome, TurnOutput, TurnRequest,
};
pub use error::PipelineError;
pub use explore::ExplorationPipeline;
pub use query::QueryPipeline;
pub use router::{RouteTarget, Router, ROUTE_ANSWER, ROUTE_EXPLORE};
pub use state::{
    validate_transition, ClusterSummary, HumanDecision, SubQueryHits, TurnStage, TurnState,
};
