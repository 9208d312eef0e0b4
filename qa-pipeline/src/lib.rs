//! End-to-end question-answering pipeline with a fairness-audit loop.
//!
//! One [`Pipeline`] value owns the embedding index, the chat provider,
//! and the configuration, and exposes the three public operations:
//! `ingest` (corpus replacement), `ask` (retrieve, assemble, generate),
//! and `audit` (seeded probes through the identical ask path). The
//! audit sees the pipeline only through [`fairness_audit::ProbePipeline`],
//! so probes exercise exactly the code real queries run.

pub mod answer;
pub mod assemble;
pub mod cfg;
pub mod error;
pub mod progress;
pub mod prompt;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use fairness_audit::{ProbeError, ProbeOutcome, ProbePipeline, run_audit};
use llm_service::LlmService;
use rag_index::{
    Document, EmbeddingIndex, IndexBackend, IngestStats, LlmEmbedder, QdrantIndex,
    UnreadableDocument, load_corpus,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use answer::{AnswerResult, ChatProvider, LlmChat};
pub use assemble::{CHUNK_OVERHEAD_TOKENS, ContextBlock, ContextEntry, assemble};
pub use cfg::PipelineConfig;
pub use error::PipelineError;
pub use fairness_audit::{AuditError, FairnessReport};
pub use progress::{IndicatifProgress, NoopProgress, Progress};

/// Outcome of one ingestion pass: what was indexed and what was skipped.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub stats: IngestStats,
    pub skipped: Vec<UnreadableDocument>,
}

/// The assembled pipeline.
pub struct Pipeline {
    index: Arc<EmbeddingIndex>,
    chat: Arc<dyn ChatProvider>,
    config: PipelineConfig,
    progress: Arc<dyn Progress>,
}

impl Pipeline {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        chat: Arc<dyn ChatProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            index,
            chat,
            config,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Wires the production stack: LLM-backed embedder + chat, and the
    /// configured index backend.
    ///
    /// # Errors
    /// [`PipelineError::InvalidConfig`] when the backend cannot be
    /// constructed.
    pub fn from_config(
        service: Arc<LlmService>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let embedder = Arc::new(LlmEmbedder::new(service.clone(), config.embedding_dim));
        let index = match config.backend {
            IndexBackend::Memory => {
                Arc::new(EmbeddingIndex::in_memory(embedder, config.index.clone()))
            }
            IndexBackend::Qdrant => {
                let backend = QdrantIndex::new(&config.qdrant, config.embedding_dim)?;
                Arc::new(EmbeddingIndex::new(
                    embedder,
                    Box::new(backend),
                    config.index.clone(),
                ))
            }
        };
        let chat = Arc::new(LlmChat::new(service, config.attempt_timeout));
        Ok(Self::new(index, chat, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replaces the indexed corpus with the documents found at `paths`.
    ///
    /// Unreadable files are skipped and reported, never fatal. The old
    /// corpus is dropped before the new one is inserted, so a query
    /// after `ingest` sees only the new documents.
    ///
    /// # Errors
    /// Embedding/provider failures or cancellation; the skip list is
    /// inside the `Ok` report.
    pub async fn ingest(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<IngestReport, PipelineError> {
        self.progress.message("loading corpus");
        let corpus = load_corpus(paths);
        for skip in &corpus.skipped {
            warn!(path = %skip.path.display(), reason = %skip.reason, "document skipped");
        }
        let report = self.ingest_documents(&corpus.documents, cancel).await?;
        Ok(IngestReport {
            skipped: corpus.skipped,
            ..report
        })
    }

    /// Like [`Pipeline::ingest`] but over already-loaded documents.
    pub async fn ingest_documents(
        &self,
        documents: &[Document],
        cancel: &CancellationToken,
    ) -> Result<IngestReport, PipelineError> {
        self.progress.message("clearing index");
        self.index.clear().await?;
        self.progress.message("embedding and indexing");
        let stats = self.index.add_documents(documents, cancel).await?;
        self.progress.finish("ingest complete");
        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            "corpus ingested"
        );
        Ok(IngestReport {
            stats,
            skipped: Vec::new(),
        })
    }

    /// Answers a question from the indexed corpus.
    ///
    /// Retrieval, context assembly, and generation run in order; an
    /// empty index is not an error, the model is told there is no
    /// supporting material.
    ///
    /// # Errors
    /// Typed per stage: [`PipelineError::InvalidArgument`] for an empty
    /// query, [`PipelineError::Index`] for retrieval failures,
    /// provider variants for generation failures, or cancellation.
    pub async fn ask(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AnswerResult, PipelineError> {
        Ok(self.ask_inner(query, cancel).await?.0)
    }

    /// Runs the seeded fairness audit through this pipeline.
    ///
    /// # Errors
    /// [`PipelineError::Audit`] wrapping config errors, an inconclusive
    /// run (with partial report), or cancellation.
    pub async fn audit(&self, cancel: &CancellationToken) -> Result<FairnessReport, PipelineError> {
        self.progress.message("running fairness probes");
        let report = run_audit(self, &self.config.audit, cancel).await?;
        self.progress.finish("audit complete");
        Ok(report)
    }

    /// Shared ask path; also reports the best retrieval score so the
    /// audit can aggregate it.
    async fn ask_inner(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<(AnswerResult, f32), PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("query is empty".into()));
        }
        let started = Instant::now();

        self.progress.message("retrieving");
        let hits = if self.index.is_empty().await {
            Vec::new()
        } else {
            self.index.query(query, self.config.top_k, cancel).await?
        };
        let top1 = hits.first().map(|h| h.score).unwrap_or(0.0);

        let context = assemble(&hits, self.config.token_budget)?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.progress.message("generating");
        let mut result = answer::generate_answer(
            self.chat.as_ref(),
            &self.config.retry,
            query,
            &context,
            None,
            cancel,
        )
        .await?;
        // End-to-end latency, retrieval included; floored at 1ms so the
        // audit's max/min ratio never divides by zero on fast runs.
        result.latency_ms = (started.elapsed().as_millis() as u64).max(1);
        Ok((result, top1))
    }
}

impl ProbePipeline for Pipeline {
    fn run_probe<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeOutcome, ProbeError>> + Send + 'a>> {
        Box::pin(async move {
            let (result, top1) = self
                .ask_inner(query, cancel)
                .await
                .map_err(|e| ProbeError::new(e.to_string()))?;
            Ok(ProbeOutcome {
                top1_similarity: top1,
                answered: result.answered(),
                latency_ms: result.latency_ms,
            })
        })
    }
}
