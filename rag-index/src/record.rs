//! Core data models used by the library.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::stable_uuid;

/// Where a document came from, for citation display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    /// Original filename (or logical name for in-memory corpora).
    pub filename: String,
    /// Optional page/section hint from the loader.
    pub section: Option<String>,
}

impl SourceMeta {
    /// Single-line label used in retrieval hits and citations.
    pub fn label(&self) -> String {
        match &self.section {
            Some(s) => format!("{} / {}", self.filename, s),
            None => self.filename.clone(),
        }
    }
}

/// A source document as loaded at ingestion time.
///
/// Immutable after creation; the whole corpus is replaced on reload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub text: String,
    pub source: SourceMeta,
}

impl Document {
    /// Creates a document with a stable id derived from its source name
    /// and content, so reloading the same corpus yields the same ids.
    pub fn new(text: impl Into<String>, source: SourceMeta) -> Self {
        let text = text.into();
        let id = stable_uuid(&format!("{}:{}", source.filename, text));
        Self { id, text, source }
    }
}

/// A token-bounded slice of a document, the unit of retrieval.
///
/// Offsets are byte positions into the owning document's text. Embeddings
/// are attached by the index and never live on this value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub text: String,
    /// Tokenizer count for `text`; also the chunking currency.
    pub token_count: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A single retrieval hit: chunk identity, similarity, and enough
/// material (text, token count, source) for context assembly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk_id: Uuid,
    pub score: f32,
    pub text: String,
    pub token_count: usize,
    pub source: Option<String>,
}
