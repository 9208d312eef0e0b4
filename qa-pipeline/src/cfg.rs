//! Runtime configuration loaded from environment variables.

use std::time::Duration;

use fairness_audit::AuditConfig;
use llm_service::RetryPolicy;
use rag_index::{IndexBackend, IndexConfig, QdrantSettings};

use crate::error::PipelineError;

/// Config bag for the pipeline. All fields have defaults via `from_env`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunks retrieved per query before budgeting.
    pub top_k: usize,
    /// Token budget for the assembled context.
    pub token_budget: usize,
    /// Wall-clock budget for a single completion attempt.
    pub attempt_timeout: Duration,
    /// Vector dimensionality expected from the embedding provider.
    pub embedding_dim: usize,
    pub backend: IndexBackend,

    pub index: IndexConfig,
    pub qdrant: QdrantSettings,
    pub retry: RetryPolicy,
    pub audit: AuditConfig,
}

impl PipelineConfig {
    /// Build from environment variables with sensible defaults:
    /// `RAG_TOP_K` (5), `TOKEN_BUDGET` (1500), `LLM_TIMEOUT_SECS` (60),
    /// `EMBEDDING_DIM` (768), `INDEX_BACKEND` (`memory`), plus the
    /// knobs each sub-config reads for itself.
    ///
    /// # Errors
    /// [`PipelineError::InvalidConfig`] for an unrecognized backend or
    /// zero-valued knobs.
    pub fn from_env() -> Result<Self, PipelineError> {
        let backend: IndexBackend = env("INDEX_BACKEND", "memory")
            .parse()
            .map_err(|e: rag_index::IndexError| PipelineError::InvalidConfig(e.to_string()))?;

        let cfg = Self {
            top_k: parse("RAG_TOP_K", 5usize),
            token_budget: parse("TOKEN_BUDGET", 1500usize),
            attempt_timeout: Duration::from_secs(parse("LLM_TIMEOUT_SECS", 60u64)),
            embedding_dim: parse("EMBEDDING_DIM", 768usize),
            backend,
            index: IndexConfig::from_env(),
            qdrant: QdrantSettings::from_env(),
            retry: RetryPolicy::from_env(),
            audit: AuditConfig::from_env(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.top_k == 0 {
            return Err(PipelineError::InvalidConfig("RAG_TOP_K must be > 0".into()));
        }
        if self.token_budget == 0 {
            return Err(PipelineError::InvalidConfig(
                "TOKEN_BUDGET must be > 0".into(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(PipelineError::InvalidConfig(
                "EMBEDDING_DIM must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn env(key: &str, dflt: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| dflt.to_string())
}

fn parse<T: std::str::FromStr>(key: &str, dflt: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(dflt)
}
