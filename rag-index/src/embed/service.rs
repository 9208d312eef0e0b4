//! [`EmbeddingsProvider`] backed by [`llm_service::LlmService`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use llm_service::LlmService;
use tracing::trace;

use crate::embed::EmbeddingsProvider;
use crate::errors::IndexError;

/// Adapter from the shared LLM client to the index's embedding seam.
pub struct LlmEmbedder {
    service: Arc<LlmService>,
    dimension: usize,
}

impl LlmEmbedder {
    pub fn new(service: Arc<LlmService>, dimension: usize) -> Self {
        Self { service, dimension }
    }
}

impl EmbeddingsProvider for LlmEmbedder {
    fn embed_batch<'a>(
        &'a self,
        inputs: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, IndexError>> + Send + 'a>> {
        Box::pin(async move {
            trace!(inputs = inputs.len(), "embedding batch");
            let vectors = self
                .service
                .embed_batch(inputs)
                .await
                .map_err(IndexError::Provider)?;
            for v in &vectors {
                if v.len() != self.dimension {
                    return Err(IndexError::VectorSizeMismatch {
                        got: v.len(),
                        want: self.dimension,
                    });
                }
            }
            Ok(vectors)
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
