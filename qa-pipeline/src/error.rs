//! Pipeline error type: every failure names the stage it came from.

use llm_service::{LlmServiceError, RetryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller error in configuration. Never retried.
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    /// Caller error in an argument to `ask`/`ingest`. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Retrieval stage failed (chunking, embedding, or vector search).
    #[error("retrieval failed: {0}")]
    Index(#[from] rag_index::IndexError),

    /// Generation stage failed fatally.
    #[error("generation failed: {0}")]
    Provider(#[source] LlmServiceError),

    /// Generation retries exhausted.
    #[error("generation retries exhausted after {attempts} attempts: {last}")]
    ProviderExhausted {
        attempts: u32,
        #[source]
        last: LlmServiceError,
    },

    /// Audit stage failed (carries partial report on inconclusive runs).
    #[error("audit failed: {0}")]
    Audit(#[from] fairness_audit::AuditError),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<RetryError<LlmServiceError>> for PipelineError {
    fn from(e: RetryError<LlmServiceError>) -> Self {
        match e {
            RetryError::Fatal(inner) => PipelineError::Provider(inner),
            RetryError::Exhausted { attempts, last } => {
                PipelineError::ProviderExhausted { attempts, last }
            }
            RetryError::Cancelled => PipelineError::Cancelled,
        }
    }
}
