use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TomeError};
use crate::types::LlmTier;

/// Top-level configuration for the tome application.
///
/// Loaded from `~/.tome/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
}

impl TomeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is outside its allowed range.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomeConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| TomeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check range constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.retrieval_count < RETRIEVAL_COUNT_MIN || p.retrieval_count > RETRIEVAL_COUNT_MAX {
            return Err(TomeError::Config(format!(
                "pipeline.retrieval_count must be within [{}, {}], got {}",
                RETRIEVAL_COUNT_MIN, RETRIEVAL_COUNT_MAX, p.retrieval_count
            )));
        }
        let e = &self.exploration;
        if !(e.sample_fraction > 0.0 && e.sample_fraction <= 1.0) {
            return Err(TomeError::Config(format!(
                "exploration.sample_fraction must be within (0, 1], got {}",
                e.sample_fraction
            )));
        }
        if !(e.cluster_granularity > 0.0 && e.cluster_granularity <= 1.0) {
            return Err(TomeError::Config(format!(
                "exploration.cluster_granularity must be within (0, 1], got {}",
                e.cluster_granularity
            )));
        }
        if e.min_cluster_size > 0 && e.max_cluster_size > 0 && e.min_cluster_size > e.max_cluster_size
        {
            return Err(TomeError::Config(format!(
                "exploration.min_cluster_size ({}) exceeds max_cluster_size ({})",
                e.min_cluster_size, e.max_cluster_size
            )));
        }
        Ok(())
    }
}

/// Smallest allowed per-sub-query retrieval count.
pub const RETRIEVAL_COUNT_MIN: usize = 5;
/// Largest allowed per-sub-query retrieval count.
pub const RETRIEVAL_COUNT_MAX: usize = 20;

/// Clamp a retrieval count into the supported range.
pub fn clamp_retrieval_count(k: usize) -> usize {
    k.clamp(RETRIEVAL_COUNT_MIN, RETRIEVAL_COUNT_MAX)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the knowledge base database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.tome/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Completion-service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model used for routing, decomposition, and map summaries.
    pub fast_model: String,
    /// Model used as fallback and, when selected, for synthesis.
    pub powerful_model: String,
    /// Base URL of the messages API.
    pub api_base: String,
    /// Maximum tokens requested per completion.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            fast_model: "claude-3-5-haiku-latest".to_string(),
            powerful_model: "claude-3-7-sonnet-latest".to_string(),
            api_base: "https://api.anthropic.com".to_string(),
            max_tokens: 1024,
        }
    }
}

/// Query-pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model tier used for the synthesis step.
    pub llm_model: LlmTier,
    /// Whether to decompose the user query into sub-queries.
    pub query_decomposition: bool,
    /// Fragments retrieved per sub-query. Range [5, 20].
    pub retrieval_count: usize,
    /// Seconds a suspended turn waits for a human decision before expiring.
    pub confirmation_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_model: LlmTier::Fast,
            query_decomposition: false,
            retrieval_count: 10,
            confirmation_timeout_secs: 90,
        }
    }
}

/// Exploration-pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Absolute sample size. When > 0, takes precedence over the fraction.
    pub sample_count: usize,
    /// Fraction of the knowledge base to sample. Range (0, 1].
    pub sample_fraction: f64,
    /// Target cluster count as a fraction of the sample size. Range (0, 1].
    pub cluster_granularity: f64,
    /// Clusters smaller than this are dropped. 0 means no lower bound.
    pub min_cluster_size: usize,
    /// Clusters larger than this are split. 0 means no upper bound.
    pub max_cluster_size: usize,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            sample_count: 0,
            sample_fraction: 0.1,
            cluster_granularity: 0.05,
            min_cluster_size: 0,
            max_cluster_size: 0,
        }
    }
}

/// Knowledge-base configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Collection name for the session.
    pub name: String,
    /// Database file name within the data directory.
    pub db_file: String,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: "knowledge_base".to_string(),
            db_file: "tome.db".to_string(),
        }
    }
}
