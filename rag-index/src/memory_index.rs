//! Vector index seam and the default in-memory backend.
//!
//! The in-memory index keeps insertion order, scores with cosine
//! similarity, and breaks score ties by insertion order so results are
//! deterministic across runs.

use std::future::Future;
use std::pin::Pin;

use tracing::trace;

use crate::errors::IndexError;
use crate::record::{Chunk, RetrievalHit};

/// One embedded chunk ready for insertion.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Citation label carried from the owning document's source.
    pub source: Option<String>,
}

/// Storage backend behind the embedding index.
///
/// Implementations must never mutate state in `search`.
pub trait VectorIndex: Send + Sync {
    /// Inserts points; all-or-nothing per call.
    fn insert<'a>(
        &'a mut self,
        points: Vec<IndexPoint>,
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>>;

    /// Returns up to `k` hits ordered by descending similarity.
    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RetrievalHit>, IndexError>> + Send + 'a>>;

    /// Removes every stored point.
    fn delete_all<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>>;

    /// Number of stored points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity; zero-norm vectors score 0.0 instead of NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Insertion-ordered in-memory index.
#[derive(Default)]
pub struct InMemoryIndex {
    points: Vec<IndexPoint>,
    dimension: usize,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            points: Vec::new(),
            dimension,
        }
    }
}

impl VectorIndex for InMemoryIndex {
    fn insert<'a>(
        &'a mut self,
        points: Vec<IndexPoint>,
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>> {
        Box::pin(async move {
            for p in &points {
                if p.vector.len() != self.dimension {
                    return Err(IndexError::VectorSizeMismatch {
                        got: p.vector.len(),
                        want: self.dimension,
                    });
                }
            }
            trace!(inserted = points.len(), total = self.points.len() + points.len(),
                   "in-memory insert");
            self.points.extend(points);
            Ok(())
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RetrievalHit>, IndexError>> + Send + 'a>>
    {
        Box::pin(async move {
            if k == 0 {
                return Err(IndexError::InvalidArgument("k must be > 0".into()));
            }
            if query.len() != self.dimension {
                return Err(IndexError::VectorSizeMismatch {
                    got: query.len(),
                    want: self.dimension,
                });
            }

            let mut scored: Vec<(usize, f32)> = self
                .points
                .iter()
                .enumerate()
                .map(|(i, p)| (i, cosine_similarity(query, &p.vector)))
                .collect();
            // Descending score, ties resolved by insertion order.
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            scored.truncate(k);

            Ok(scored
                .into_iter()
                .map(|(i, score)| {
                    let p = &self.points[i];
                    RetrievalHit {
                        chunk_id: p.chunk.id,
                        score,
                        text: p.chunk.text.clone(),
                        token_count: p.chunk.token_count,
                        source: p.source.clone(),
                    }
                })
                .collect())
        })
    }

    fn delete_all<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>> {
        Box::pin(async move {
            self.points.clear();
            Ok(())
        })
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::stable_uuid;

    fn point(tag: &str, vector: Vec<f32>) -> IndexPoint {
        IndexPoint {
            chunk: Chunk {
                id: stable_uuid(tag),
                document_id: stable_uuid("doc"),
                text: tag.to_string(),
                token_count: 1,
                start_offset: 0,
                end_offset: tag.len(),
            },
            vector,
            source: Some(format!("{tag}.txt")),
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let mut idx = InMemoryIndex::new(2);
        idx.insert(vec![
            point("east", vec![1.0, 0.0]),
            point("north", vec![0.0, 1.0]),
            point("northeast", vec![1.0, 1.0]),
        ])
        .await
        .unwrap();

        let hits = idx.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "northeast");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn k_zero_is_invalid() {
        let idx = InMemoryIndex::new(2);
        assert!(matches!(
            idx.search(&[1.0, 0.0], 0).await,
            Err(IndexError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn dimension_mismatch_rejected_on_insert_and_search() {
        let mut idx = InMemoryIndex::new(3);
        let err = idx.insert(vec![point("short", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, IndexError::VectorSizeMismatch { got: 1, want: 3 }));
        assert!(matches!(
            idx.search(&[1.0], 1).await,
            Err(IndexError::VectorSizeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn delete_all_empties_the_index() {
        let mut idx = InMemoryIndex::new(1);
        idx.insert(vec![point("a", vec![1.0])]).await.unwrap();
        assert_eq!(idx.len(), 1);
        idx.delete_all().await.unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn zero_norm_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
