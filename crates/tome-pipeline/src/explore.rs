//! The exploration path: sample, cluster, map, reduce.
//!
//! Every cluster is summarized concurrently; the fan-in barrier waits for
//! all of them (success or failure) before reduce runs. Per-cluster
//! failures shrink the reduce input and are reported as a shortfall; only a
//! total map failure aborts the turn.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use tome_core::{config::ExplorationConfig, Fragment, Message};
use tome_index::KnowledgeBase;
use tome_llm::{CompletionRequest, SharedCompletion};
use uuid::Uuid;

use crate::cluster::{cluster_fragments, Cluster, ClusterParams};
use crate::error::PipelineError;
use crate::prompts;
use crate::state::{ClusterSummary, TurnStage, TurnState};

/// The sample-cluster-map-reduce pipeline.
pub struct ExplorationPipeline {
    summarizer: SharedCompletion,
    config: ExplorationConfig,
    max_tokens: u32,
}

impl ExplorationPipeline {
    pub fn new(
        summarizer: SharedCompletion,
        config: ExplorationConfig,
        max_tokens: u32,
    ) -> Self {
        Self {
            summarizer,
            config,
            max_tokens,
        }
    }

    /// Run the full exploration turn and return the overview text.
    pub async fn run(
        &self,
        kb: &Arc<KnowledgeBase>,
        state: &mut TurnState,
    ) -> Result<String, PipelineError> {
        let sample = self.sample(kb, state)?;
        let clusters = self.cluster(kb, state, &sample)?;
        self.map(state, &sample, &clusters).await?;
        self.reduce(state).await
    }

    /// Stage 1: draw a bounded subset of the knowledge base.
    fn sample(
        &self,
        kb: &Arc<KnowledgeBase>,
        state: &mut TurnState,
    ) -> Result<Vec<Fragment>, PipelineError> {
        state.advance(TurnStage::Sampling)?;

        let total = kb.len();
        if total == 0 {
            return Err(PipelineError::EmptyKnowledgeBase);
        }

        // Absolute count takes precedence over the fraction when both are
        // configured; either way the sample never exceeds the collection.
        let requested = if self.config.sample_count > 0 {
            self.config.sample_count
        } else {
            ((total as f64 * self.config.sample_fraction).ceil() as usize).max(1)
        };

        let sample = kb
            .sample(requested.min(total))
            .map_err(|e| PipelineError::KnowledgeBase(e.to_string()))?;
        info!(total, sampled = sample.len(), "Sampled knowledge base");
        Ok(sample)
    }

    /// Stage 2: partition the sample into topic clusters.
    fn cluster(
        &self,
        kb: &Arc<KnowledgeBase>,
        state: &mut TurnState,
        sample: &[Fragment],
    ) -> Result<Vec<Cluster>, PipelineError> {
        state.advance(TurnStage::Clustering)?;

        let mut items: Vec<(Uuid, Vec<f32>)> = Vec::with_capacity(sample.len());
        for fragment in sample {
            let embedding = kb
                .embedding(fragment.id)
                .map_err(|e| PipelineError::KnowledgeBase(e.to_string()))?
                .ok_or_else(|| {
                    PipelineError::KnowledgeBase(format!(
                        "sampled fragment {} has no stored embedding",
                        fragment.id
                    ))
                })?;
            items.push((fragment.id, embedding));
        }

        let params = ClusterParams {
            granularity: self.config.cluster_granularity,
            min_size: self.config.min_cluster_size,
            max_size: self.config.max_cluster_size,
        };
        let clusters = cluster_fragments(&items, &params);
        info!(clusters = clusters.len(), "Sample clustered");
        Ok(clusters)
    }

    /// Stage 3: summarize every cluster concurrently, then wait for all of
    /// them before anything reaches reduce.
    async fn map(
        &self,
        state: &mut TurnState,
        sample: &[Fragment],
        clusters: &[Cluster],
    ) -> Result<(), PipelineError> {
        state.advance(TurnStage::Mapping)?;

        let by_id: HashMap<Uuid, &Fragment> = sample.iter().map(|f| (f.id, f)).collect();

        let mut join = JoinSet::new();
        for cluster in clusters {
            let members: Vec<&Fragment> = cluster
                .members
                .iter()
                .filter_map(|id| by_id.get(id).copied())
                .collect();
            let mut messages = state.messages.clone();
            messages.push(Message::user(prompts::map_cluster(&members)));

            let summarizer = Arc::clone(&self.summarizer);
            let cluster_id = cluster.id;
            let max_tokens = self.max_tokens;
            join.spawn(async move {
                let result = summarizer
                    .complete_boxed(CompletionRequest::text(messages, max_tokens))
                    .await;
                (cluster_id, result)
            });
        }

        let mut summaries = Vec::new();
        let mut failed = 0usize;
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((cluster_id, Ok(output))) => match output.as_text() {
                    Some(text) => summaries.push(ClusterSummary {
                        cluster_id,
                        summary: text.to_string(),
                    }),
                    None => {
                        warn!(cluster_id, "Cluster summary was not text");
                        failed += 1;
                    }
                },
                Ok((cluster_id, Err(e))) => {
                    warn!(cluster_id, error = %e, "Cluster summarization failed");
                    failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Cluster summarization task panicked");
                    failed += 1;
                }
            }
        }

        if summaries.is_empty() {
            return Err(PipelineError::ClusterSummaries(clusters.len()));
        }
        if failed > 0 {
            warn!(failed, succeeded = summaries.len(), "Proceeding with partial map results");
        }

        summaries.sort_by_key(|s| s.cluster_id);
        state.cluster_summaries = summaries;
        state.failed_clusters = failed;
        Ok(())
    }

    /// Stage 4: combine the cluster summaries into one overview.
    async fn reduce(&self, state: &mut TurnState) -> Result<String, PipelineError> {
        state.advance(TurnStage::Reducing)?;

        let mut messages = state.messages.clone();
        messages.push(Message::user(prompts::reduce(&state.cluster_summaries)));

        let output = self
            .summarizer
            .complete_boxed(CompletionRequest::text(messages, self.max_tokens))
            .await?;
        let overview = output
            .as_text()
            .ok_or_else(|| {
                PipelineError::Completion(tome_llm::CompletionError::InvalidResponse(
                    "reduce returned a tool choice instead of text".to_string(),
                ))
            })?
            .to_string();

        state.output = Some(overview.clone());
        state.advance(TurnStage::Done)?;
        Ok(overview)
    }
}
