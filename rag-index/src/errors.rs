//! Unified error types for the crate.

use thiserror::Error;

use llm_service::{LlmServiceError, RetryError, Transience};

/// Top-level error for rag-index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Caller error: bad chunking parameters. Never retried.
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    /// Caller error: bad argument to a query/ingest call. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-transient embedding provider failure, surfaced immediately.
    #[error("embedding provider error: {0}")]
    Provider(#[source] LlmServiceError),

    /// Transient provider failures persisted past the retry budget.
    #[error("embedding retries exhausted after {attempts} attempts: {last}")]
    ProviderExhausted {
        attempts: u32,
        #[source]
        last: LlmServiceError,
    },

    /// Mismatch in vector dimensionality across chunks.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Qdrant client errors (wrapped).
    #[error("qdrant error: {0}")]
    Qdrant(String),

    /// The caller's cancellation token fired mid-operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl Transience for IndexError {
    fn is_transient(&self) -> bool {
        match self {
            IndexError::Provider(inner) => inner.is_transient(),
            _ => false,
        }
    }
}

impl From<RetryError<IndexError>> for IndexError {
    fn from(e: RetryError<IndexError>) -> Self {
        match e {
            RetryError::Fatal(inner) => inner,
            RetryError::Exhausted {
                attempts,
                last: IndexError::Provider(inner),
            } => IndexError::ProviderExhausted {
                attempts,
                last: inner,
            },
            RetryError::Exhausted { last, .. } => last,
            RetryError::Cancelled => IndexError::Cancelled,
        }
    }
}

impl From<RetryError<LlmServiceError>> for IndexError {
    fn from(e: RetryError<LlmServiceError>) -> Self {
        match e {
            RetryError::Fatal(inner) => IndexError::Provider(inner),
            RetryError::Exhausted { attempts, last } => {
                IndexError::ProviderExhausted { attempts, last }
            }
            RetryError::Cancelled => IndexError::Cancelled,
        }
    }
}

/// Failure to turn a source file into plain text.
///
/// Ingestion skips the offending document and keeps going; callers get
/// the failed paths back for reporting.
#[derive(Debug, Error)]
#[error("unreadable document {path}: {reason}")]
pub struct UnreadableDocument {
    /// Path of the document that could not be read.
    pub path: std::path::PathBuf,
    /// Human-readable cause (I/O error, unsupported format, bad encoding).
    pub reason: String,
}
