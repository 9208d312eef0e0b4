//! Concurrent, retried embedding of chunk batches.
//!
//! Chunks are embedded in fixed-size batches, up to `concurrency`
//! batches in flight. Every batch runs under the shared retry policy;
//! any batch failing fatally (or exhausting its retries) fails the whole
//! call, so callers can treat inserts as all-or-nothing. Output order
//! matches input order regardless of completion order.

use futures::StreamExt;
use futures::stream;
use llm_service::{RetryPolicy, run_with_retry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::embed::EmbeddingsProvider;
use crate::errors::IndexError;

pub struct EmbedPool<'a> {
    provider: &'a dyn EmbeddingsProvider,
    retry: RetryPolicy,
    batch_size: usize,
    concurrency: usize,
}

impl<'a> EmbedPool<'a> {
    pub fn new(
        provider: &'a dyn EmbeddingsProvider,
        retry: RetryPolicy,
        batch_size: usize,
        concurrency: usize,
    ) -> Result<Self, IndexError> {
        if batch_size == 0 {
            return Err(IndexError::InvalidConfig("embed batch_size must be > 0".into()));
        }
        if concurrency == 0 {
            return Err(IndexError::InvalidConfig(
                "embed concurrency must be > 0".into(),
            ));
        }
        Ok(Self {
            provider,
            retry,
            batch_size,
            concurrency,
        })
    }

    /// Embeds all texts, one vector per input, in input order.
    ///
    /// # Errors
    /// Fails with the first batch error, [`IndexError::Cancelled`] when
    /// the token fires, or [`IndexError::VectorSizeMismatch`] when the
    /// provider misbehaves.
    pub async fn embed_all(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<(usize, &[String])> =
            texts.chunks(self.batch_size).enumerate().collect();
        debug!(
            texts = texts.len(),
            batches = batches.len(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            "embedding corpus"
        );

        let mut results: Vec<(usize, Vec<Vec<f32>>)> = stream::iter(batches)
            .map(|(idx, batch)| async move {
                if cancel.is_cancelled() {
                    return Err(IndexError::Cancelled);
                }
                trace!(batch = idx, size = batch.len(), "embedding batch");
                let vectors =
                    run_with_retry(&self.retry, cancel, || self.provider.embed_batch(batch))
                        .await
                        .map_err(IndexError::from)?;
                if vectors.len() != batch.len() {
                    return Err(IndexError::InvalidArgument(format!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        batch.len()
                    )));
                }
                Ok((idx, vectors))
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<Result<_, IndexError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().flat_map(|(_, v)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        dim: usize,
    }

    impl EmbeddingsProvider for CountingProvider {
        fn embed_batch<'a>(
            &'a self,
            inputs: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, IndexError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                // Encode the input length so ordering is observable.
                Ok(inputs
                    .iter()
                    .map(|t| vec![t.len() as f32; self.dim])
                    .collect())
            })
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn preserves_input_order_across_batches() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            dim: 2,
        };
        let pool = EmbedPool::new(&provider, RetryPolicy::default(), 3, 4).unwrap();
        let input = texts(10);
        let out = pool
            .embed_all(&input, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.len(), 10);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            dim: 2,
        };
        let pool = EmbedPool::new(&provider, RetryPolicy::default(), 3, 2).unwrap();
        let out = pool
            .embed_all(&[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    struct FlakyProvider {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl EmbeddingsProvider for FlakyProvider {
        fn embed_batch<'a>(
            &'a self,
            inputs: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, IndexError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    return Err(IndexError::Provider(
                        llm_service::ProviderError::new(
                            llm_service::LlmProvider::Ollama,
                            llm_service::ProviderErrorKind::AttemptTimeout(
                                std::time::Duration::from_millis(1),
                            ),
                        )
                        .into(),
                    ));
                }
                Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
            })
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn two_transient_failures_then_success_within_retry_limit() {
        let provider = FlakyProvider {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        };
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
            max_total_backoff: std::time::Duration::from_secs(1),
        };
        let pool = EmbedPool::new(&provider, retry, 4, 1).unwrap();
        let out = pool
            .embed_all(&texts(3), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            dim: 2,
        };
        let pool = EmbedPool::new(&provider, RetryPolicy::default(), 2, 2).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pool.embed_all(&texts(4), &cancel).await.unwrap_err();
        assert!(matches!(err, IndexError::Cancelled));
    }

    #[test]
    fn zero_batch_or_concurrency_rejected() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            dim: 2,
        };
        assert!(EmbedPool::new(&provider, RetryPolicy::default(), 0, 2).is_err());
        assert!(EmbedPool::new(&provider, RetryPolicy::default(), 2, 0).is_err());
    }
}
