//! Step functions for the debate graph.
//!
//! Each step reads the parts of [`crate::state::ResearchState`] it needs,
//! talks to collaborators, and returns its output for the executor to apply.
//! Steps never mutate state and never emit lifecycle events themselves; that
//! separation keeps the transcript, the counters, and the event stream under
//! a single writer.

pub mod challenge;
pub mod publish;
pub mod retrieve;
pub mod synthesize;
pub mod validate;

use crate::state::{Criticism, Document};

/// Renders retrieved documents into prompt context.
pub(crate) fn render_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| format!("Content: {} (Score: {:.2})", doc.content, doc.score))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders criticisms into prompt context, one bullet per line.
pub(crate) fn render_criticisms(criticisms: &[Criticism]) -> String {
    criticisms
        .iter()
        .map(|c| format!("- {}", c.text))
        .collect::<Vec<_>>()
        .join("\n")
}
