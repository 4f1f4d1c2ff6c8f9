//! Draft synthesis step.
//!
//! Writes the initial draft from retrieved documents, or rewrites the
//! previous draft when the challenge pass left criticisms behind. Generated
//! segments are forwarded into the event sink as advisory token events while
//! the backend streams; the decision rules never look at them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::{render_criticisms, render_documents};
use crate::collab::GenerationBackend;
use crate::error::GenerationError;
use crate::events::{EventSink, ResearchEvent};
use crate::state::ResearchState;

const SYNTHESIZER_PROMPT: &str =
    "You are a research synthesizer. Write a clear, concise answer to the \
     user's question based only on the provided documents. Cite document \
     scores where they support a claim.";

const REVISER_PROMPT: &str =
    "You are a research reviser. Rewrite the draft answer so it fully \
     addresses every criticism, using the original documents as evidence. \
     Produce a complete, standalone answer that integrates the feedback \
     instead of replying to it point by point.";

/// Produces the next draft answer for the session.
///
/// Returns the full draft; the executor applies it to state and emits the
/// closing `draft_generated` event. Token events are emitted here, so they
/// always precede that closing event.
pub async fn run(
    state: &ResearchState,
    generation: &Arc<dyn GenerationBackend>,
    sink: &EventSink,
) -> crate::error::Result<String> {
    let documents = render_documents(&state.documents);
    let (prompt, context) = if state.criticisms.is_empty() {
        (
            SYNTHESIZER_PROMPT,
            format!("Question: {}\n\nDocuments:\n{documents}", state.question()),
        )
    } else {
        debug!(
            criticism_count = state.criticisms.len(),
            "Revising draft against criticisms"
        );
        (
            REVISER_PROMPT,
            format!(
                "Original Question: {}\n\nOriginal Documents:\n{documents}\n\n\
                 Previous Draft Answer:\n{}\n\nCriticisms to Address:\n{}",
                state.question(),
                state.draft_answer.as_deref().unwrap_or_default(),
                render_criticisms(&state.criticisms)
            ),
        )
    };

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let backend = Arc::clone(generation);
    let handle =
        tokio::spawn(async move { backend.generate_streaming(prompt, &context, tx).await });

    // Forward segments while the backend streams. The channel closes when
    // the generation task drops its sender, so this loop always finishes
    // before the draft is returned.
    while let Some(token) = rx.recv().await {
        sink.emit(ResearchEvent::DraftAnswerToken { token }).await?;
    }

    let draft = handle.await.map_err(|e| GenerationError::Connection {
        message: format!("generation task failed: {e}"),
    })??;

    if draft.trim().is_empty() {
        return Err(GenerationError::ResponseParse {
            message: "generation backend returned an empty draft".to_string(),
        }
        .into());
    }

    Ok(draft)
}
