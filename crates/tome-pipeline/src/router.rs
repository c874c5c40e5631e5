//! Two-way turn router.
//!
//! One classification call decides between the query pipeline (default) and
//! the exploration pipeline (explicit exploration intent only). The model is
//! forced to return a structured choice; anything else fails the turn rather
//! than guessing a destination.

use serde::{Deserialize, Serialize};
use tracing::debug;

use tome_core::Message;
use tome_llm::{CompletionRequest, SharedCompletion, ToolSpec};

use crate::error::PipelineError;
use crate::prompts;

/// Tool name for the default question-answering destination.
pub const ROUTE_ANSWER: &str = "answer_question";
/// Tool name for the exploration destination.
pub const ROUTE_EXPLORE: &str = "explore_overview";

/// Where the router sends a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    /// Answer a specific question: decompose, confirm, retrieve, synthesize.
    Query,
    /// Produce an exploratory overview: sample, cluster, map, reduce.
    Exploration,
}

/// Classifies each turn into exactly one of two destinations.
pub struct Router {
    completion: SharedCompletion,
    max_tokens: u32,
}

impl Router {
    pub fn new(completion: SharedCompletion, max_tokens: u32) -> Self {
        Self {
            completion,
            max_tokens,
        }
    }

    /// Decide the destination for the latest user utterance.
    ///
    /// The decision is a pure function of (history, utterance): the same
    /// inputs produce the same classification request every time.
    pub async fn route(
        &self,
        history: &[Message],
        user_query: &str,
    ) -> Result<RouteTarget, PipelineError> {
        let mut messages = history.to_vec();
        messages.push(Message::user(prompts::router(user_query)));

        let request = CompletionRequest::choice(
            messages,
            vec![
                ToolSpec::new(
                    ROUTE_ANSWER,
                    "Answer a regular question or information request (DEFAULT).",
                ),
                ToolSpec::new(
                    ROUTE_EXPLORE,
                    "Produce an exploratory overview; ONLY for explicit requests \
                     for an overview, themes, exploration, or key ideas.",
                ),
            ],
            self.max_tokens,
        )
        .with_system(prompts::ROUTER_SYSTEM);

        let output = self
            .completion
            .complete_boxed(request)
            .await
            .map_err(|e| PipelineError::Routing(e.to_string()))?;

        let target = match output.as_choice() {
            Some(ROUTE_ANSWER) => RouteTarget::Query,
            Some(ROUTE_EXPLORE) => RouteTarget::Exploration,
            Some(other) => {
                return Err(PipelineError::Routing(format!(
                    "unknown destination '{}'",
                    other
                )))
            }
            None => {
                return Err(PipelineError::Routing(
                    "classifier produced free text instead of a destination".to_string(),
                ))
            }
        };
        debug!(?target, "Turn routed");
        Ok(target)
    }
}
