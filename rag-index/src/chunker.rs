//! Token-bounded, overlapping document chunking.
//!
//! Goals:
//! - Produce stable, overlapping token windows with correct byte spans.
//! - Prefer sentence/paragraph boundaries; fall back to hard token cuts
//!   so `max_tokens` is always respected.
//! - Be fully deterministic: identical input and config always produce
//!   the identical chunk sequence and offsets.
//!
//! Adjacent chunks share `overlap_tokens` tokens (subject to boundary
//! snapping), so byte coverage of the source document is gapless.

use tracing::{debug, trace};

use crate::errors::IndexError;
use crate::ids::stable_uuid;
use crate::record::{Chunk, Document};
use crate::tokenize::{TokenSpan, token_spans};

/// Splits a document into overlapping token-bounded chunks.
///
/// # Parameters
/// - `max_tokens`: window size in tokens (must be > 0).
/// - `overlap_tokens`: tokens shared between consecutive chunks
///   (`0 ≤ overlap_tokens < max_tokens`).
///
/// # Errors
/// Returns [`IndexError::InvalidConfig`] when `max_tokens` is zero or
/// the overlap is not smaller than the window.
pub fn chunk(
    document: &Document,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<Chunk>, IndexError> {
    if max_tokens == 0 {
        return Err(IndexError::InvalidConfig("max_tokens must be > 0".into()));
    }
    if overlap_tokens >= max_tokens {
        return Err(IndexError::InvalidConfig(format!(
            "overlap_tokens ({overlap_tokens}) must be < max_tokens ({max_tokens})"
        )));
    }

    let text = document.text.as_str();
    let spans = token_spans(text);
    if spans.is_empty() {
        trace!("chunk: empty document, nothing to do");
        return Ok(Vec::new());
    }

    let n = spans.len();
    let mut out = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + max_tokens).min(n);
        let end = if hard_end < n {
            // Snap back to the last sentence end inside the window;
            // a window with no boundary takes the hard cut.
            (start..hard_end)
                .rev()
                .find(|&i| is_sentence_end(text, &spans, i))
                .map(|i| i + 1)
                .unwrap_or(hard_end)
        } else {
            n
        };

        let byte_start = spans[start].start;
        let byte_end = spans[end - 1].end;
        out.push(Chunk {
            id: stable_uuid(&format!("{}:{}:{}", document.id, byte_start, byte_end)),
            document_id: document.id,
            text: text[byte_start..byte_end].to_string(),
            token_count: end - start,
            start_offset: byte_start,
            end_offset: byte_end,
        });

        if end == n {
            break;
        }
        // Forward progress even when the overlap swallows a short chunk.
        start = end.saturating_sub(overlap_tokens).max(start + 1);
    }

    debug!(
        chunks = out.len(),
        tokens = n,
        max_tokens,
        overlap_tokens,
        "chunked document {}",
        document.id
    );
    Ok(out)
}

/// Whether token `i` closes a sentence: it ends with terminal
/// punctuation (allowing trailing quotes/brackets), or a paragraph break
/// follows it, or it is the last token.
fn is_sentence_end(text: &str, spans: &[TokenSpan], i: usize) -> bool {
    let tok = &text[spans[i].start..spans[i].end];
    let trimmed = tok.trim_end_matches(['"', '\'', ')', ']']);
    if trimmed.ends_with(['.', '!', '?']) {
        return true;
    }
    match spans.get(i + 1) {
        Some(next) => text[spans[i].end..next.start].matches('\n').count() >= 2,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SourceMeta;
    use crate::tokenize::count_tokens;

    fn doc(text: &str) -> Document {
        Document::new(
            text,
            SourceMeta {
                filename: "test.txt".into(),
                section: None,
            },
        )
    }

    /// Three paragraphs of eight 5-token sentences each (120 tokens).
    fn three_paragraphs() -> String {
        let sentence = "alpha beta gamma delta omega.";
        let paragraph = vec![sentence; 8].join(" ");
        vec![paragraph; 3].join("\n\n")
    }

    #[test]
    fn rejects_bad_config() {
        let d = doc("some text here.");
        assert!(matches!(chunk(&d, 0, 0), Err(IndexError::InvalidConfig(_))));
        assert!(matches!(
            chunk(&d, 10, 10),
            Err(IndexError::InvalidConfig(_))
        ));
        assert!(matches!(
            chunk(&d, 10, 12),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunk(&doc(""), 50, 10).unwrap().is_empty());
        assert!(chunk(&doc("  \n \t"), 50, 10).unwrap().is_empty());
    }

    #[test]
    fn chunking_is_deterministic() {
        let d = doc(&three_paragraphs());
        let a = chunk(&d, 50, 10).unwrap();
        let b = chunk(&d, 50, 10).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.start_offset, y.start_offset);
            assert_eq!(x.end_offset, y.end_offset);
            assert_eq!(x.text, y.text);
        }
    }

    #[test]
    fn three_paragraph_scenario_covers_document_without_gaps() {
        let text = three_paragraphs();
        let d = doc(&text);
        let chunks = chunk(&d, 50, 10).unwrap();
        assert_eq!(chunks.len(), 3);

        // Full coverage, no gaps between consecutive chunks.
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
        for w in chunks.windows(2) {
            assert!(w[1].start_offset <= w[0].end_offset, "gap between chunks");
            assert!(w[1].start_offset > w[0].start_offset);
        }

        // Overlap: each boundary shares tokens with its predecessor.
        for c in &chunks {
            assert!(c.end_offset > c.start_offset);
            assert!(c.token_count <= 50);
            assert_eq!(c.token_count, count_tokens(&c.text));
        }
        assert_eq!(chunks[0].token_count, 50);
        assert_eq!(chunks[1].token_count, 50);
        assert_eq!(chunks[2].token_count, 40);
    }

    #[test]
    fn hard_cut_when_no_sentence_boundary_exists() {
        let words = vec!["word"; 30].join(" ");
        let d = doc(&words);
        let chunks = chunk(&d, 10, 2).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].token_count, 10);
        assert_eq!(chunks[3].token_count, 6);
        assert_eq!(chunks.last().unwrap().end_offset, words.len());
    }

    #[test]
    fn token_count_matches_tokenizer_for_every_chunk() {
        let d = doc("One short sentence. Another, slightly longer sentence! A third? Yes.");
        for c in chunk(&d, 6, 2).unwrap() {
            assert_eq!(c.token_count, count_tokens(&c.text));
            assert!(c.end_offset > c.start_offset);
        }
    }
}
