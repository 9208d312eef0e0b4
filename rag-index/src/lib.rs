//! Document ingestion, embedding, and similarity retrieval.
//!
//! The crate turns source documents into overlapping token-bounded
//! chunks, embeds them through a pluggable provider, and serves cosine
//! top-k retrieval from either an in-memory index or a Qdrant
//! collection. Reads and writes go through a reader-writer lock:
//! queries share read access, ingestion and clearing take exclusive
//! write access, so a query never observes a half-ingested corpus.

pub mod chunker;
pub mod embed;
pub mod embed_pool;
pub mod errors;
pub mod ids;
pub mod loaders;
pub mod memory_index;
pub mod qdrant_facade;
pub mod record;
pub mod tokenize;

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use embed::{EmbeddingsProvider, LlmEmbedder};
pub use errors::{IndexError, UnreadableDocument};
pub use ids::stable_uuid;
pub use loaders::{LoadedCorpus, load_corpus};
pub use memory_index::{InMemoryIndex, IndexPoint, VectorIndex, cosine_similarity};
pub use qdrant_facade::{QdrantIndex, QdrantSettings};
pub use record::{Chunk, Document, RetrievalHit, SourceMeta};

use embed_pool::EmbedPool;
use llm_service::RetryPolicy;

/* ------------------------------ config ------------------------------ */

/// Which storage backend serves the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    Memory,
    Qdrant,
}

impl std::str::FromStr for IndexBackend {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(IndexBackend::Memory),
            "qdrant" => Ok(IndexBackend::Qdrant),
            other => Err(IndexError::InvalidConfig(format!(
                "unknown INDEX_BACKEND '{other}' (expected 'memory' or 'qdrant')"
            ))),
        }
    }
}

/// Tunables for chunking and embedding.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub embed_batch: usize,
    pub embed_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 400,
            chunk_overlap_tokens: 40,
            embed_batch: 16,
            embed_concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl IndexConfig {
    /// Env override of the defaults: `CHUNK_MAX_TOKENS`,
    /// `CHUNK_OVERLAP_TOKENS`, `EMBED_BATCH`, `EMBED_CONCURRENCY`, plus
    /// the `RETRY_*` family.
    pub fn from_env() -> Self {
        fn parse(k: &str, dflt: usize) -> usize {
            std::env::var(k)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(dflt)
        }
        let d = Self::default();
        Self {
            chunk_max_tokens: parse("CHUNK_MAX_TOKENS", d.chunk_max_tokens),
            chunk_overlap_tokens: parse("CHUNK_OVERLAP_TOKENS", d.chunk_overlap_tokens),
            embed_batch: parse("EMBED_BATCH", d.embed_batch),
            embed_concurrency: parse("EMBED_CONCURRENCY", d.embed_concurrency),
            retry: RetryPolicy::from_env(),
        }
    }
}

/* ------------------------------ facade ------------------------------ */

/// Counts reported after an ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
}

/// The embedding index: chunking + embedding + vector search behind one
/// handle that is cheap to clone via `Arc`.
pub struct EmbeddingIndex {
    backend: RwLock<Box<dyn VectorIndex>>,
    embedder: Arc<dyn EmbeddingsProvider>,
    config: IndexConfig,
}

impl EmbeddingIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingsProvider>,
        backend: Box<dyn VectorIndex>,
        config: IndexConfig,
    ) -> Self {
        Self {
            backend: RwLock::new(backend),
            embedder,
            config,
        }
    }

    /// Convenience constructor over [`InMemoryIndex`].
    pub fn in_memory(embedder: Arc<dyn EmbeddingsProvider>, config: IndexConfig) -> Self {
        let dim = embedder.dimension();
        Self::new(embedder, Box::new(InMemoryIndex::new(dim)), config)
    }

    /// Chunks, embeds, and stores the given documents.
    ///
    /// All vectors are computed before the index write lock is taken, so
    /// a failed embedding pass leaves the index untouched and readers
    /// are only blocked for the insert itself.
    ///
    /// # Errors
    /// Chunking config errors, provider failures past the retry budget,
    /// vector size mismatches, or [`IndexError::Cancelled`].
    pub async fn add_documents(
        &self,
        documents: &[Document],
        cancel: &CancellationToken,
    ) -> Result<IngestStats, IndexError> {
        let mut chunks = Vec::new();
        let mut sources = Vec::new();
        for doc in documents {
            for c in chunker::chunk(
                doc,
                self.config.chunk_max_tokens,
                self.config.chunk_overlap_tokens,
            )? {
                sources.push(doc.source.label());
                chunks.push(c);
            }
        }
        if chunks.is_empty() {
            debug!("add_documents: nothing to index");
            return Ok(IngestStats {
                documents: documents.len(),
                chunks: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let pool = EmbedPool::new(
            self.embedder.as_ref(),
            self.config.retry.clone(),
            self.config.embed_batch,
            self.config.embed_concurrency,
        )?;
        let vectors = pool.embed_all(&texts, cancel).await?;

        let points: Vec<IndexPoint> = chunks
            .into_iter()
            .zip(vectors)
            .zip(sources)
            .map(|((chunk, vector), source)| IndexPoint {
                chunk,
                vector,
                source: Some(source),
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let stats = IngestStats {
            documents: documents.len(),
            chunks: points.len(),
        };
        self.backend.write().await.insert(points).await?;
        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            "indexed documents"
        );
        Ok(stats)
    }

    /// Embeds the query text and returns the top-`k` hits by descending
    /// cosine similarity. Read-only: concurrent queries share the lock.
    ///
    /// # Errors
    /// [`IndexError::InvalidArgument`] for `k == 0` or an empty query.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalHit>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be > 0".into()));
        }
        if text.trim().is_empty() {
            return Err(IndexError::InvalidArgument("query text is empty".into()));
        }

        let input = vec![text.to_string()];
        let vectors = llm_service::run_with_retry(&self.config.retry, cancel, || {
            self.embedder.embed_batch(&input)
        })
        .await
        .map_err(IndexError::from)?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::InvalidArgument("provider returned no vector".into()))?;

        self.backend.read().await.search(&vector, k).await
    }

    /// Removes everything from the index.
    pub async fn clear(&self) -> Result<(), IndexError> {
        self.backend.write().await.delete_all().await
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.backend.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    /// Deterministic embedder: one dimension per vocabulary word, value
    /// = occurrences of that word in the lowercased text.
    struct KeywordEmbedder {
        vocab: Vec<&'static str>,
    }

    impl EmbeddingsProvider for KeywordEmbedder {
        fn embed_batch<'a>(
            &'a self,
            inputs: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, IndexError>> + Send + 'a>>
        {
            Box::pin(async move {
                Ok(inputs
                    .iter()
                    .map(|t| {
                        let lower = t.to_lowercase();
                        self.vocab
                            .iter()
                            .map(|w| lower.matches(w).count() as f32)
                            .collect()
                    })
                    .collect())
            })
        }

        fn dimension(&self) -> usize {
            self.vocab.len()
        }
    }

    fn test_index() -> EmbeddingIndex {
        let embedder = Arc::new(KeywordEmbedder {
            vocab: vec!["ownership", "lifetime", "garbage", "thread"],
        });
        EmbeddingIndex::in_memory(
            embedder,
            IndexConfig {
                chunk_max_tokens: 32,
                chunk_overlap_tokens: 4,
                embed_batch: 2,
                embed_concurrency: 2,
                retry: RetryPolicy::default(),
            },
        )
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new(
                "Ownership rules govern moves. Ownership transfers on assignment.",
                SourceMeta {
                    filename: "ownership.md".into(),
                    section: Some("Basics".into()),
                },
            ),
            Document::new(
                "Garbage collection pauses the world. Garbage builds up over time.",
                SourceMeta {
                    filename: "gc.md".into(),
                    section: None,
                },
            ),
        ]
    }

    #[tokio::test]
    async fn ingest_then_query_ranks_relevant_chunk_first() {
        let index = test_index();
        let cancel = CancellationToken::new();
        let stats = index.add_documents(&docs(), &cancel).await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 2);
        assert_eq!(index.len().await, 2);

        let hits = index
            .query("how does ownership work", 2, &cancel)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("Ownership"));
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].source.as_deref(), Some("ownership.md / Basics"));
    }

    #[tokio::test]
    async fn self_retrieval_ranks_the_chunk_itself_first() {
        let index = test_index();
        let cancel = CancellationToken::new();
        index.add_documents(&docs(), &cancel).await.unwrap();

        let verbatim = "Ownership rules govern moves. Ownership transfers on assignment.";
        let hits = index.query(verbatim, 1, &cancel).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, verbatim);
    }

    #[tokio::test]
    async fn query_does_not_mutate_the_index() {
        let index = test_index();
        let cancel = CancellationToken::new();
        index.add_documents(&docs(), &cancel).await.unwrap();
        let before = index.len().await;
        for _ in 0..3 {
            index.query("garbage collection", 1, &cancel).await.unwrap();
        }
        assert_eq!(index.len().await, before);
    }

    #[tokio::test]
    async fn k_zero_and_empty_query_are_invalid() {
        let index = test_index();
        let cancel = CancellationToken::new();
        assert!(matches!(
            index.query("anything", 0, &cancel).await,
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            index.query("   ", 3, &cancel).await,
            Err(IndexError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn clear_empties_the_index() {
        let index = test_index();
        let cancel = CancellationToken::new();
        index.add_documents(&docs(), &cancel).await.unwrap();
        index.clear().await.unwrap();
        assert!(index.is_empty().await);
        let hits = index.query("ownership", 3, &cancel).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn backend_parses_from_env_strings() {
        assert_eq!("memory".parse::<IndexBackend>().unwrap(), IndexBackend::Memory);
        assert_eq!("Qdrant".parse::<IndexBackend>().unwrap(), IndexBackend::Qdrant);
        assert!("chroma".parse::<IndexBackend>().is_err());
    }
}
