//! Answer generation with retry, per-attempt timeouts, and citation
//! parse-back.
//!
//! The chat backend sits behind [`ChatProvider`] so tests can script
//! completions. Citation markers `[n]` found in the model output are
//! resolved against the assembled context; markers that match nothing
//! are dropped silently (logged, never surfaced to the caller), so
//! `cited_chunk_ids` is always a subset of the context's chunks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use llm_service::{
    Completion, LlmService, LlmServiceError, ProviderError, ProviderErrorKind, RetryPolicy,
    TokenUsage, run_with_retry,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::assemble::ContextBlock;
use crate::error::PipelineError;
use crate::prompt;

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("hardcoded citation pattern"));

/// Chat completion seam.
pub trait ChatProvider: Send + Sync {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, LlmServiceError>> + Send + 'a>>;
}

/// Production [`ChatProvider`] over the shared LLM client, enforcing a
/// wall-clock budget per attempt. A timed-out attempt surfaces as a
/// transient [`ProviderErrorKind::AttemptTimeout`], so the retry loop
/// treats it like any other transient failure.
pub struct LlmChat {
    service: Arc<LlmService>,
    attempt_timeout: Duration,
}

impl LlmChat {
    pub fn new(service: Arc<LlmService>, attempt_timeout: Duration) -> Self {
        Self {
            service,
            attempt_timeout,
        }
    }
}

impl ChatProvider for LlmChat {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, LlmServiceError>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::time::timeout(self.attempt_timeout, self.service.complete(prompt, system))
                .await
            {
                Ok(res) => res,
                Err(_elapsed) => {
                    let provider = self.service.profiles().0.provider;
                    Err(ProviderError::new(
                        provider,
                        ProviderErrorKind::AttemptTimeout(self.attempt_timeout),
                    )
                    .into())
                }
            }
        })
    }
}

/// A generated answer with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub query: String,
    pub answer_text: String,
    /// Chunks actually cited by the answer, in first-appearance order.
    /// Always a subset of the chunks that were in the context.
    pub cited_chunk_ids: Vec<Uuid>,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
}

impl AnswerResult {
    /// Non-empty answer text, the `answer_rate` criterion.
    pub fn answered(&self) -> bool {
        !self.answer_text.trim().is_empty()
    }
}

/// Runs the generation stage: prompt build, retried completion,
/// citation resolution.
///
/// # Errors
/// Fatal provider errors, exhausted retries, or cancellation, all as
/// typed [`PipelineError`] variants.
pub async fn generate_answer(
    provider: &dyn ChatProvider,
    retry: &RetryPolicy,
    query: &str,
    context: &ContextBlock,
    system: Option<&str>,
    cancel: &CancellationToken,
) -> Result<AnswerResult, PipelineError> {
    let user_prompt = prompt::build_prompt(query, context);
    let system = system.unwrap_or(prompt::DEFAULT_SYSTEM);

    let started = Instant::now();
    let completion = run_with_retry(retry, cancel, || {
        provider.complete(&user_prompt, Some(system))
    })
    .await
    .map_err(PipelineError::from)?;
    let latency_ms = started.elapsed().as_millis() as u64;

    let cited_chunk_ids = parse_citations(&completion.text, context);
    debug!(
        latency_ms,
        citations = cited_chunk_ids.len(),
        answer_chars = completion.text.len(),
        "answer generated"
    );

    Ok(AnswerResult {
        query: query.to_string(),
        answer_text: completion.text,
        cited_chunk_ids,
        token_usage: completion.usage,
        latency_ms,
    })
}

/// Extracts `[n]` markers, resolves them to chunk ids, deduplicates
/// preserving first appearance, and drops markers outside the context.
fn parse_citations(answer: &str, context: &ContextBlock) -> Vec<Uuid> {
    let mut out = Vec::new();
    for cap in CITATION_RE.captures_iter(answer) {
        let Ok(marker) = cap[1].parse::<usize>() else {
            continue;
        };
        match context.chunk_for_marker(marker) {
            Some(id) if !out.contains(&id) => out.push(id),
            Some(_) => {}
            None => {
                warn!(marker, "answer cited a marker outside the context, dropping");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble;
    use rag_index::{RetrievalHit, stable_uuid};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedChat {
        reply: String,
        transient_failures: AtomicU32,
    }

    impl ChatProvider for ScriptedChat {
        fn complete<'a>(
            &'a self,
            _prompt: &'a str,
            _system: Option<&'a str>,
        ) -> Pin<Box<dyn Future<Output = Result<Completion, LlmServiceError>> + Send + 'a>>
        {
            Box::pin(async move {
                let remaining = self.transient_failures.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                    return Err(ProviderError::new(
                        llm_service::LlmProvider::Ollama,
                        ProviderErrorKind::AttemptTimeout(Duration::from_millis(1)),
                    )
                    .into());
                }
                Ok(Completion {
                    text: self.reply.clone(),
                    usage: TokenUsage::default(),
                })
            })
        }
    }

    fn chat(reply: &str) -> ScriptedChat {
        ScriptedChat {
            reply: reply.to_string(),
            transient_failures: AtomicU32::new(0),
        }
    }

    fn context() -> ContextBlock {
        let hits = vec![
            RetrievalHit {
                chunk_id: stable_uuid("a"),
                score: 0.9,
                text: "alpha".into(),
                token_count: 1,
                source: None,
            },
            RetrievalHit {
                chunk_id: stable_uuid("b"),
                score: 0.8,
                text: "beta".into(),
                token_count: 1,
                source: None,
            },
        ];
        assemble(&hits, 100).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_total_backoff: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn citations_resolve_and_dedupe_in_first_appearance_order() {
        let ctx = context();
        let provider = chat("Beta first [2], alpha next [1], beta again [2].");
        let res = generate_answer(
            &provider,
            &fast_retry(),
            "q?",
            &ctx,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            res.cited_chunk_ids,
            vec![stable_uuid("b"), stable_uuid("a")]
        );
        assert!(res.answered());
    }

    #[tokio::test]
    async fn unmatched_markers_are_dropped_silently() {
        let ctx = context();
        let provider = chat("See [1] and the imaginary [7].");
        let res = generate_answer(
            &provider,
            &fast_retry(),
            "q?",
            &ctx,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(res.cited_chunk_ids, vec![stable_uuid("a")]);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_before_success() {
        let ctx = context();
        let provider = ScriptedChat {
            reply: "grounded [1]".into(),
            transient_failures: AtomicU32::new(2),
        };
        let res = generate_answer(
            &provider,
            &fast_retry(),
            "q?",
            &ctx,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(res.cited_chunk_ids, vec![stable_uuid("a")]);
    }

    #[tokio::test]
    async fn empty_context_still_produces_an_answer_without_citations() {
        let provider = chat("The corpus contains no supporting material.");
        let res = generate_answer(
            &provider,
            &fast_retry(),
            "q?",
            &ContextBlock::default(),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(res.cited_chunk_ids.is_empty());
        assert!(res.answered());
    }
}
