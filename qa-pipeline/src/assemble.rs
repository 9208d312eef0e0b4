//! Token-budgeted context assembly.
//!
//! Retrieval hits arrive in descending-similarity order and that order
//! is preserved verbatim in the assembled block; assembly only decides
//! where to stop. Each included chunk pays a fixed overhead on top of
//! its own token count, covering the `[n]` marker and source line added
//! by prompt formatting.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use rag_index::RetrievalHit;

use crate::error::PipelineError;

/// Formatting cost per included chunk, in tokens.
pub const CHUNK_OVERHEAD_TOKENS: usize = 8;

/// One passage selected into the context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// 1-based citation marker, as rendered in the prompt.
    pub marker: usize,
    pub chunk_id: Uuid,
    pub text: String,
    pub token_count: usize,
    pub source: Option<String>,
}

/// The assembled context: ordered entries plus their total token cost,
/// overhead included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub entries: Vec<ContextEntry>,
    pub total_tokens: usize,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a citation marker back to its chunk id.
    pub fn chunk_for_marker(&self, marker: usize) -> Option<Uuid> {
        self.entries
            .iter()
            .find(|e| e.marker == marker)
            .map(|e| e.chunk_id)
    }
}

/// Greedily packs hits into the token budget, stopping at the first hit
/// that would overflow it. Hit order is kept untouched.
///
/// An empty result is not an error: the caller decides how to answer
/// without grounding.
///
/// # Errors
/// [`PipelineError::InvalidArgument`] when `token_budget` is zero.
pub fn assemble(hits: &[RetrievalHit], token_budget: usize) -> Result<ContextBlock, PipelineError> {
    if token_budget == 0 {
        return Err(PipelineError::InvalidArgument(
            "token_budget must be > 0".into(),
        ));
    }

    let mut block = ContextBlock::default();
    for hit in hits {
        let cost = hit.token_count + CHUNK_OVERHEAD_TOKENS;
        if block.total_tokens + cost > token_budget {
            break;
        }
        block.total_tokens += cost;
        block.entries.push(ContextEntry {
            marker: block.entries.len() + 1,
            chunk_id: hit.chunk_id,
            text: hit.text.clone(),
            token_count: hit.token_count,
            source: hit.source.clone(),
        });
    }

    debug!(
        selected = block.entries.len(),
        offered = hits.len(),
        total_tokens = block.total_tokens,
        token_budget,
        "assembled context"
    );
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_index::stable_uuid;

    fn hit(tag: &str, score: f32, tokens: usize) -> RetrievalHit {
        RetrievalHit {
            chunk_id: stable_uuid(tag),
            score,
            text: format!("passage {tag}"),
            token_count: tokens,
            source: Some(format!("{tag}.md")),
        }
    }

    #[test]
    fn keeps_similarity_order_and_assigns_markers() {
        let hits = vec![hit("a", 0.9, 10), hit("b", 0.7, 10), hit("c", 0.5, 10)];
        let block = assemble(&hits, 100).unwrap();
        assert_eq!(block.entries.len(), 3);
        assert_eq!(block.entries[0].marker, 1);
        assert_eq!(block.entries[2].marker, 3);
        assert_eq!(block.entries[0].chunk_id, hits[0].chunk_id);
        assert_eq!(block.entries[2].chunk_id, hits[2].chunk_id);
    }

    #[test]
    fn stops_at_first_overflowing_hit() {
        // Each hit costs its tokens + overhead; the second overflows and
        // assembly must not skip ahead to the smaller third hit.
        let hits = vec![hit("a", 0.9, 20), hit("b", 0.7, 50), hit("c", 0.5, 1)];
        let budget = 20 + CHUNK_OVERHEAD_TOKENS + 10;
        let block = assemble(&hits, budget).unwrap();
        assert_eq!(block.entries.len(), 1);
        assert_eq!(block.entries[0].chunk_id, hits[0].chunk_id);
        assert_eq!(block.total_tokens, 20 + CHUNK_OVERHEAD_TOKENS);
    }

    #[test]
    fn empty_hits_yield_empty_block() {
        let block = assemble(&[], 100).unwrap();
        assert!(block.is_empty());
        assert_eq!(block.total_tokens, 0);
    }

    #[test]
    fn zero_budget_is_invalid() {
        assert!(matches!(
            assemble(&[hit("a", 0.9, 5)], 0),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn marker_lookup_resolves_chunk_ids() {
        let hits = vec![hit("a", 0.9, 5), hit("b", 0.8, 5)];
        let block = assemble(&hits, 100).unwrap();
        assert_eq!(block.chunk_for_marker(2), Some(hits[1].chunk_id));
        assert_eq!(block.chunk_for_marker(9), None);
    }
}
