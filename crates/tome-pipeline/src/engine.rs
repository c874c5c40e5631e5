//! Turn engine: the two-phase API the UI layer drives.
//!
//! `start_turn` applies any knowledge-base command, routes the utterance,
//! and either completes the turn (exploration) or suspends it at the human
//! confirmation step (query path). `resume_turn` picks a suspended turn back
//! up with a structured decision. Suspended state is serializable, so a
//! pending turn can be checkpointed across a process boundary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use tome_core::{KbCommand, Message, TomeConfig};
use tome_index::KnowledgeBase;
use tome_llm::SharedCompletion;
use tome_parse::DocParser;

use crate::error::PipelineError;
use crate::explore::ExplorationPipeline;
use crate::query::QueryPipeline;
use crate::router::{RouteTarget, Router};
use crate::state::{HumanDecision, TurnState};

/// A document attached to a knowledge-base command.
#[derive(Clone, Debug)]
pub struct DocumentUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// One user turn: free text, an explicit command, or both.
#[derive(Clone, Debug, Default)]
pub struct TurnRequest {
    pub text: String,
    pub command: Option<KbCommand>,
    pub documents: Vec<DocumentUpload>,
}

impl TurnRequest {
    /// A plain chat message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A knowledge-base command with attached documents.
    pub fn command(command: KbCommand, documents: Vec<DocumentUpload>) -> Self {
        Self {
            text: String::new(),
            command: Some(command),
            documents,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// The completed result of a turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnOutput {
    pub text: String,
    /// Route taken; absent for command-only turns.
    pub route: Option<RouteTarget>,
    /// Fragments ingested by a knowledge-base command on this turn.
    pub ingested: usize,
    /// Clusters whose summarization failed (exploration turns).
    pub failed_clusters: usize,
}

/// What `start_turn`/`resume_turn` hand back to the caller.
#[derive(Clone, Debug)]
pub enum TurnOutcome {
    Completed(TurnOutput),
    /// The turn is parked at human confirmation; resume with a decision.
    Suspended {
        handle: Uuid,
        subqueries: Vec<String>,
    },
}

/// The completion services the engine runs on.
pub struct EngineServices {
    /// Fallback-composed service for routing, decomposition, and map-reduce.
    pub general: SharedCompletion,
    /// Primary-only service for synthesis (no fallback, by design).
    pub synthesis: SharedCompletion,
}

/// Central coordinator wiring the command handler, router, and pipelines.
pub struct TomeEngine {
    kb: Arc<KnowledgeBase>,
    parser: DocParser,
    router: Router,
    query: QueryPipeline,
    explore: ExplorationPipeline,
    confirmation_timeout_secs: u64,
    pending: Mutex<HashMap<Uuid, TurnState>>,
    history: Mutex<Vec<Message>>,
}

impl TomeEngine {
    /// Build an engine over a knowledge base from explicit configuration.
    pub fn new(kb: Arc<KnowledgeBase>, services: EngineServices, config: &TomeConfig) -> Self {
        let max_tokens = config.llm.max_tokens;
        let router = Router::new(Arc::clone(&services.general), max_tokens);
        let query = QueryPipeline::new(
            Arc::clone(&services.general),
            services.synthesis,
            &config.pipeline,
            max_tokens,
        );
        let explore =
            ExplorationPipeline::new(services.general, config.exploration.clone(), max_tokens);

        Self {
            kb,
            parser: DocParser::default(),
            router,
            query,
            explore,
            confirmation_timeout_secs: config.pipeline.confirmation_timeout_secs,
            pending: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Start a new turn.
    ///
    /// An attached knowledge-base command runs first; it is the only way the
    /// knowledge base is mutated. A command-only turn completes with an
    /// ingestion report and never reaches the router.
    pub async fn start_turn(&self, request: TurnRequest) -> Result<TurnOutcome, PipelineError> {
        let mut ingested = 0usize;
        if let Some(command) = request.command {
            ingested = self.apply_command(command, &request.documents).await?;
            if request.text.trim().is_empty() {
                return Ok(TurnOutcome::Completed(TurnOutput {
                    text: format!(
                        "Knowledge base '{}' now contains {} fragments.",
                        self.kb.name(),
                        self.kb.len()
                    ),
                    route: None,
                    ingested,
                    failed_clusters: 0,
                }));
            }
        }

        let text = request.text.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let history = self.history();
        let mut state = TurnState::new(self.kb.name(), self.kb.generation(), history.clone(), &text);
        self.push_history(Message::user(&text));

        match self.router.route(&history, &text).await? {
            RouteTarget::Query => {
                self.query.decompose(&mut state).await?;
                state.suspended_at = Some(Utc::now());
                let handle = state.id;
                let subqueries = state.subqueries.clone();
                self.pending.lock().unwrap().insert(handle, state);
                info!(%handle, "Turn suspended awaiting confirmation");
                Ok(TurnOutcome::Suspended { handle, subqueries })
            }
            RouteTarget::Exploration => {
                let overview = self.explore.run(&self.kb, &mut state).await?;
                self.push_history(Message::assistant(&overview));
                Ok(TurnOutcome::Completed(TurnOutput {
                    text: overview,
                    route: Some(RouteTarget::Exploration),
                    ingested,
                    failed_clusters: state.failed_clusters,
                }))
            }
        }
    }

    /// Resume a suspended turn with the user's decision.
    ///
    /// The turn is released whether it then completes or fails; only an
    /// invalid decision leaves it parked for another attempt.
    pub async fn resume_turn(
        &self,
        handle: Uuid,
        decision: HumanDecision,
    ) -> Result<TurnOutcome, PipelineError> {
        let mut state = self
            .pending
            .lock()
            .unwrap()
            .remove(&handle)
            .ok_or(PipelineError::UnknownTurn(handle))?;

        if let Some(suspended_at) = state.suspended_at {
            let age = Utc::now().signed_duration_since(suspended_at).num_seconds();
            if age > self.confirmation_timeout_secs as i64 {
                warn!(%handle, age, "Suspended turn expired");
                return Err(PipelineError::SuspendedTimeout(
                    self.confirmation_timeout_secs,
                ));
            }
        }

        // A turn never mixes fragments from two knowledge-base generations.
        if state.kb_name != self.kb.name() || state.kb_generation != self.kb.generation() {
            return Err(PipelineError::KnowledgeBase(
                "knowledge base was recreated while the turn was suspended".to_string(),
            ));
        }

        match decision {
            HumanDecision::Approve => {}
            HumanDecision::Revise(subqueries) => {
                let subqueries: Vec<String> = subqueries
                    .into_iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect();
                if subqueries.is_empty() {
                    // Leave the turn parked so the caller can try again.
                    self.pending.lock().unwrap().insert(handle, state);
                    return Err(PipelineError::InvalidDecision(
                        "revised sub-queries are empty".to_string(),
                    ));
                }
                state.subqueries = subqueries;
            }
        }
        state.suspended_at = None;

        self.query.retrieve(&self.kb, &mut state).await?;
        let answer = self.query.synthesize(&mut state).await?;
        self.push_history(Message::assistant(&answer));

        Ok(TurnOutcome::Completed(TurnOutput {
            text: answer,
            route: Some(RouteTarget::Query),
            ingested: 0,
            failed_clusters: 0,
        }))
    }

    /// Abandon a suspended turn, releasing its state.
    ///
    /// Returns true if the turn existed. The knowledge base is untouched.
    pub fn abandon_turn(&self, handle: Uuid) -> bool {
        self.pending.lock().unwrap().remove(&handle).is_some()
    }

    /// Drop every suspended turn older than the confirmation timeout.
    ///
    /// Returns the number of turns released.
    pub fn expire_pending(&self) -> usize {
        let timeout = self.confirmation_timeout_secs as i64;
        let now = Utc::now();
        let mut pending = self.pending.lock().unwrap();
        let before = pending.len();
        pending.retain(|_, state| match state.suspended_at {
            Some(at) => now.signed_duration_since(at).num_seconds() <= timeout,
            None => true,
        });
        let released = before - pending.len();
        if released > 0 {
            info!(released, "Expired suspended turns");
        }
        released
    }

    /// Number of turns currently suspended.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Serialize all suspended turns for a process-boundary checkpoint.
    pub fn checkpoint_pending(&self) -> Result<String, PipelineError> {
        let pending = self.pending.lock().unwrap();
        let states: Vec<&TurnState> = pending.values().collect();
        serde_json::to_string(&states)
            .map_err(|e| PipelineError::KnowledgeBase(format!("checkpoint serialize: {}", e)))
    }

    /// Restore suspended turns from a checkpoint. Returns how many loaded.
    pub fn restore_pending(&self, json: &str) -> Result<usize, PipelineError> {
        let states: Vec<TurnState> = serde_json::from_str(json)
            .map_err(|e| PipelineError::KnowledgeBase(format!("checkpoint parse: {}", e)))?;
        let count = states.len();
        let mut pending = self.pending.lock().unwrap();
        for state in states {
            pending.insert(state.id, state);
        }
        Ok(count)
    }

    /// Ordered conversation history for the session.
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().unwrap().clone()
    }

    /// The knowledge base this engine serves.
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    // -- Private helpers --

    async fn apply_command(
        &self,
        command: KbCommand,
        documents: &[DocumentUpload],
    ) -> Result<usize, PipelineError> {
        let mut fragments = Vec::new();
        for doc in documents {
            fragments.extend(self.parser.parse(&doc.bytes, &doc.filename)?);
        }

        let count = match command {
            KbCommand::Create => self.kb.recreate(fragments).await,
            KbCommand::Update => self.kb.append(fragments).await,
        }
        .map_err(|e| PipelineError::KnowledgeBase(e.to_string()))?;

        info!(?command, ingested = count, "Knowledge base command applied");
        Ok(count)
    }

    fn push_history(&self, message: Message) {
        self.history.lock().unwrap().push(message);
    }
}
