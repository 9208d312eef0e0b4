//! Embedding provider seam.
//!
//! The index never talks to an LLM backend directly; it goes through
//! [`EmbeddingsProvider`] so tests can substitute deterministic vectors.

pub mod service;

use std::future::Future;
use std::pin::Pin;

use crate::errors::IndexError;

pub use service::LlmEmbedder;

/// Batched text-to-vector provider.
///
/// Implementations must return exactly one vector per input, in input
/// order, each with the dimensionality they advertise via
/// [`EmbeddingsProvider::dimension`].
pub trait EmbeddingsProvider: Send + Sync {
    /// Embeds a batch of texts.
    ///
    /// # Errors
    /// Provider failures map to [`IndexError::Provider`]; a vector whose
    /// length disagrees with [`Self::dimension`] is
    /// [`IndexError::VectorSizeMismatch`].
    fn embed_batch<'a>(
        &'a self,
        inputs: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, IndexError>> + Send + 'a>>;

    /// Expected vector dimensionality.
    fn dimension(&self) -> usize;
}
