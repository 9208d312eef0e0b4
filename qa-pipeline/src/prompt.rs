//! Prompt construction for grounded answering.

use crate::assemble::ContextBlock;

/// System prompt used unless the caller overrides it.
pub const DEFAULT_SYSTEM: &str = "You are a document-grounded assistant. Answer strictly from the \
provided passages and cite them with their [n] markers. If the passages do not contain the \
answer, say so plainly instead of guessing.";

/// Renders the user prompt: numbered passages (with source lines) then
/// the question. With no passages, the prompt tells the model to state
/// that the corpus holds no supporting material.
pub fn build_prompt(query: &str, context: &ContextBlock) -> String {
    let mut out = String::new();

    if context.is_empty() {
        out.push_str(
            "No passages were retrieved for this question. State that the corpus contains no \
supporting material and do not invent citations.\n\n",
        );
    } else {
        out.push_str("Passages:\n\n");
        for entry in &context.entries {
            out.push_str(&format!("[{}] ", entry.marker));
            if let Some(src) = &entry.source {
                out.push_str(&format!("({src}) "));
            }
            out.push_str(&entry.text);
            out.push_str("\n\n");
        }
    }

    out.push_str("Question: ");
    out.push_str(query.trim());
    out.push('\n');
    out
}
