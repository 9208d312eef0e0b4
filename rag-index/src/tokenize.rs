//! Deterministic whitespace tokenizer with byte spans.
//!
//! The pipeline needs a tokenizer that is cheap, offline, and perfectly
//! reproducible; chunk offsets, token budgets, and chunk `token_count`
//! all come from here. Counts are approximate relative to any given
//! model tokenizer, but they are consistent across the whole pipeline,
//! which is what the budget math requires.

/// Byte range of one token within the source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

/// Splits `text` into whitespace-delimited tokens with byte spans.
///
/// Deterministic: identical input always yields identical spans.
pub fn token_spans(text: &str) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push(TokenSpan { start: s, end: i });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push(TokenSpan {
            start: s,
            end: text.len(),
        });
    }
    spans
}

/// Token count for `text` under the same rules as [`token_spans`].
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_cover_words_exactly() {
        let text = "alpha  beta\n\ngamma.";
        let spans = token_spans(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].start..spans[0].end], "alpha");
        assert_eq!(&text[spans[1].start..spans[1].end], "beta");
        assert_eq!(&text[spans[2].start..spans[2].end], "gamma.");
        assert_eq!(count_tokens(text), 3);
    }

    #[test]
    fn empty_and_whitespace_only() {
        assert!(token_spans("").is_empty());
        assert!(token_spans("  \n\t ").is_empty());
        assert_eq!(count_tokens("   "), 0);
    }

    #[test]
    fn count_matches_spans() {
        let text = "one two  three\tfour\nfive";
        assert_eq!(token_spans(text).len(), count_tokens(text));
    }
}
