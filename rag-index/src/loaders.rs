//! Corpus loading with skip-and-report semantics.
//!
//! Each path is turned into zero or more [`Document`]s. Unreadable or
//! unsupported files never abort a load: they are collected as
//! [`UnreadableDocument`] entries so the caller can surface them.

use std::path::Path;

use tracing::{debug, warn};

use crate::errors::UnreadableDocument;
use crate::record::{Document, SourceMeta};

/// Outcome of loading a corpus: every document that parsed, plus every
/// file that could not be read.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub documents: Vec<Document>,
    pub skipped: Vec<UnreadableDocument>,
}

/// Loads every path into documents, skipping unreadable files.
pub fn load_corpus<P: AsRef<Path>>(paths: &[P]) -> LoadedCorpus {
    let mut out = LoadedCorpus::default();
    for p in paths {
        let path = p.as_ref();
        match load_file(path) {
            Ok(mut docs) => {
                debug!(path = %path.display(), documents = docs.len(), "loaded file");
                out.documents.append(&mut docs);
            }
            Err(skip) => {
                warn!(path = %skip.path.display(), reason = %skip.reason, "skipping unreadable document");
                out.skipped.push(skip);
            }
        }
    }
    out
}

/// Loads a single file. Markdown files are split into one document per
/// top-level heading section; everything else is one document per file.
pub fn load_file(path: &Path) -> Result<Vec<Document>, UnreadableDocument> {
    let text = std::fs::read_to_string(path).map_err(|e| UnreadableDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if text.trim().is_empty() {
        return Err(UnreadableDocument {
            path: path.to_path_buf(),
            reason: "file is empty".into(),
        });
    }

    let filename = file_name(path);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("md") | Some("markdown") => Ok(split_markdown(&text, &filename)),
        Some("txt") | Some("text") | None => Ok(vec![Document::new(
            &text,
            SourceMeta {
                filename,
                section: None,
            },
        )]),
        Some(other) => Err(UnreadableDocument {
            path: path.to_path_buf(),
            reason: format!("unsupported file type: .{other}"),
        }),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Splits markdown on `#`-prefixed headings. Text before the first
/// heading becomes a section-less document.
fn split_markdown(text: &str, filename: &str) -> Vec<Document> {
    let mut docs = Vec::new();
    let mut section: Option<String> = None;
    let mut body = String::new();

    let mut flush = |section: &Option<String>, body: &mut String| {
        if !body.trim().is_empty() {
            docs.push(Document::new(
                body.trim(),
                SourceMeta {
                    filename: filename.to_string(),
                    section: section.clone(),
                },
            ));
        }
        body.clear();
    };

    for line in text.lines() {
        if let Some(title) = heading_title(line) {
            flush(&section, &mut body);
            section = Some(title);
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush(&section, &mut body);
    docs
}

fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some(rest.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn markdown_splits_on_headings() {
        let docs = split_markdown(
            "preamble text\n\n# Intro\nfirst section.\n\n## Details\nsecond section.\n",
            "guide.md",
        );
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].source.section, None);
        assert_eq!(docs[1].source.section.as_deref(), Some("Intro"));
        assert_eq!(docs[2].source.section.as_deref(), Some("Details"));
        assert!(docs[1].text.contains("first section"));
    }

    #[test]
    fn heading_detection_ignores_non_headings() {
        assert_eq!(heading_title("# Title"), Some("Title".into()));
        assert_eq!(heading_title("### Deep "), Some("Deep".into()));
        assert_eq!(heading_title("#not-a-heading"), None);
        assert_eq!(heading_title("plain line"), None);
        assert_eq!(heading_title("####### too deep"), None);
    }

    #[test]
    fn missing_file_is_reported_not_fatal() {
        let corpus = load_corpus(&[PathBuf::from("/nonexistent/nowhere.txt")]);
        assert!(corpus.documents.is_empty());
        assert_eq!(corpus.skipped.len(), 1);
        assert_eq!(corpus.skipped[0].path, Path::new("/nonexistent/nowhere.txt"));
    }

    #[test]
    fn unsupported_extension_is_skipped() {
        let dir = std::env::temp_dir();
        let path = dir.join("rag_index_loader_test.bin");
        std::fs::write(&path, b"binary-ish").unwrap();
        let corpus = load_corpus(&[path.clone()]);
        assert!(corpus.documents.is_empty());
        assert_eq!(corpus.skipped.len(), 1);
        assert!(corpus.skipped[0].reason.contains("unsupported"));
        let _ = std::fs::remove_file(path);
    }
}
