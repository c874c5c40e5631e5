//! The default question-answering path: decompose, confirm, retrieve,
//! synthesize.
//!
//! Decomposition and synthesis are completion calls; retrieval fans out one
//! nearest-neighbor query per confirmed sub-query. The suspension between
//! decompose and retrieve is owned by the engine; this type only implements
//! the stages around it.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use tome_core::{clamp_retrieval_count, config::PipelineConfig, Message};
use tome_index::KnowledgeBase;
use tome_llm::{CompletionError, CompletionRequest, SharedCompletion};

use crate::error::PipelineError;
use crate::prompts;
use crate::state::{SubQueryHits, TurnStage, TurnState};

/// Stages of the question-answering pipeline.
pub struct QueryPipeline {
    decomposer: SharedCompletion,
    /// Synthesis deliberately has no fallback: a failure here surfaces to
    /// the user instead of silently switching models.
    synthesizer: SharedCompletion,
    query_decomposition: bool,
    retrieval_count: usize,
    max_tokens: u32,
}

impl QueryPipeline {
    pub fn new(
        decomposer: SharedCompletion,
        synthesizer: SharedCompletion,
        config: &PipelineConfig,
        max_tokens: u32,
    ) -> Self {
        Self {
            decomposer,
            synthesizer,
            query_decomposition: config.query_decomposition,
            retrieval_count: config.retrieval_count,
            max_tokens,
        }
    }

    /// Stage 1: split the query into sub-queries.
    ///
    /// With decomposition disabled this is a pure pass-through: the
    /// sub-query list is exactly the original query and no completion call
    /// is made.
    pub async fn decompose(&self, state: &mut TurnState) -> Result<(), PipelineError> {
        state.advance(TurnStage::Decomposing)?;

        if !self.query_decomposition {
            state.subqueries = vec![state.user_query.clone()];
            state.advance(TurnStage::AwaitingConfirmation)?;
            return Ok(());
        }

        let mut messages = state.messages.clone();
        messages.push(Message::user(prompts::decompose(&state.user_query)));

        let output = self
            .decomposer
            .complete_boxed(CompletionRequest::text(messages, self.max_tokens))
            .await?;
        let text = output.as_text().ok_or_else(|| {
            PipelineError::Completion(CompletionError::InvalidResponse(
                "decomposition returned a tool choice instead of text".to_string(),
            ))
        })?;

        let subqueries: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        state.subqueries = if subqueries.is_empty() {
            vec![state.user_query.clone()]
        } else {
            subqueries
        };
        debug!(count = state.subqueries.len(), "Query decomposed");
        state.advance(TurnStage::AwaitingConfirmation)?;
        Ok(())
    }

    /// Stage 3: retrieve fragments for every confirmed sub-query.
    ///
    /// Sub-queries have no ordering dependency, so their index queries run
    /// concurrently; each result set is associated back to its originating
    /// sub-query. An unreachable index is fatal to the turn; an empty result
    /// set is not.
    pub async fn retrieve(
        &self,
        kb: &Arc<KnowledgeBase>,
        state: &mut TurnState,
    ) -> Result<(), PipelineError> {
        state.advance(TurnStage::Retrieving)?;
        let k = clamp_retrieval_count(self.retrieval_count);

        let mut join = JoinSet::new();
        for (i, subquery) in state.subqueries.iter().enumerate() {
            let kb = Arc::clone(kb);
            let subquery = subquery.clone();
            join.spawn(async move {
                let result = kb.query(&subquery, k).await;
                (i, subquery, result)
            });
        }

        let mut results: Vec<Option<SubQueryHits>> = vec![None; state.subqueries.len()];
        while let Some(joined) = join.join_next().await {
            let (i, subquery, outcome) =
                joined.map_err(|e| PipelineError::Retrieval(format!("retrieval task: {}", e)))?;
            let scored = outcome.map_err(|e| PipelineError::Retrieval(e.to_string()))?;
            results[i] = Some(SubQueryHits {
                subquery,
                fragments: scored.into_iter().map(|s| s.fragment).collect(),
            });
        }

        state.retrieved = results.into_iter().flatten().collect();
        info!(
            subqueries = state.retrieved.len(),
            fragments = state.unique_fragments().len(),
            "Retrieval complete"
        );
        Ok(())
    }

    /// Stage 4: synthesize the answer from history, retrieved fragments,
    /// and the original query.
    pub async fn synthesize(&self, state: &mut TurnState) -> Result<String, PipelineError> {
        state.advance(TurnStage::Synthesizing)?;

        let prompt = prompts::synthesize(&state.user_query, &state.unique_fragments());
        let mut messages = state.messages.clone();
        messages.push(Message::user(prompt));

        let output = self
            .synthesizer
            .complete_boxed(CompletionRequest::text(messages, self.max_tokens))
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        let answer = output
            .as_text()
            .ok_or_else(|| {
                PipelineError::Synthesis("synthesis returned a tool choice instead of text".to_string())
            })?
            .to_string();

        state.output = Some(answer.clone());
        state.advance(TurnStage::Done)?;
        Ok(answer)
    }
}
