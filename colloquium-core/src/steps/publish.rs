//! Publication step.
//!
//! Freezes the accepted draft into an immutable research packet, fingerprints
//! it, and persists it through the key-value store and the task ledger.
//! Collaborator failures here are warnings, never fatal: by the time publish
//! runs the debate has already concluded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::collab::{KvStore, TaskLedger};
use crate::state::{Document, ResearchState, TranscriptEntry};

/// The immutable output of a completed debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPacket {
    pub paper_id: Uuid,
    pub question: String,
    pub final_answer: String,
    /// Evidence the final answer was synthesized from.
    pub sources: Vec<Document>,
    /// Debate transcript up to the moment of publication.
    pub transcript: Vec<TranscriptEntry>,
}

/// What the store holds under `paper/{session_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPacket {
    fingerprint: String,
    packet: ResearchPacket,
}

/// Result of the publish step.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub paper_id: Uuid,
    /// Hex sha256 over the packet's canonical JSON.
    pub fingerprint: String,
    /// Non-fatal collaborator failures, already logged.
    pub warnings: Vec<String>,
    /// True when the store already held this session's packet and the
    /// existing fingerprint was returned instead of rewriting.
    pub reused: bool,
}

/// Publishes the session's accepted draft.
///
/// At most one packet is ever written per session: an existing entry under
/// the session's key short-circuits with its stored fingerprint.
pub async fn run(
    state: &ResearchState,
    store: &Arc<dyn KvStore>,
    ledger: &Arc<dyn TaskLedger>,
) -> PublishOutcome {
    let mut warnings = Vec::new();
    let key = format!("paper/{}", state.session_id);

    match store.get(&key).await {
        Ok(Some(existing)) => match serde_json::from_str::<StoredPacket>(&existing) {
            Ok(stored) => {
                info!(
                    session_id = %state.session_id,
                    fingerprint = stored.fingerprint.as_str(),
                    "Packet already published, reusing stored fingerprint"
                );
                return PublishOutcome {
                    paper_id: stored.packet.paper_id,
                    fingerprint: stored.fingerprint,
                    warnings,
                    reused: true,
                };
            }
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "Stored packet unreadable, rewriting");
                warnings.push(format!("stored packet unreadable: {e}"));
            }
        },
        Ok(None) => {}
        Err(e) => {
            warn!(session_id = %state.session_id, error = %e, "Packet lookup failed");
            warnings.push(format!("packet lookup failed: {e}"));
        }
    }

    // Synthesize guarantees a non-empty draft before the decision can route
    // the debate here.
    let final_answer = state.draft_answer.clone().unwrap_or_default();
    let packet = ResearchPacket {
        paper_id: state.session_id,
        question: state.question().to_string(),
        final_answer,
        sources: state.documents.clone(),
        transcript: state.transcript.clone(),
    };

    let canonical = match serde_json::to_vec(&packet) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(session_id = %state.session_id, error = %e, "Packet serialization failed");
            warnings.push(format!("packet serialization failed: {e}"));
            // Degrade to fingerprinting the answer text alone.
            packet.final_answer.clone().into_bytes()
        }
    };
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    let fingerprint = format!("{:x}", hasher.finalize());

    let stored = StoredPacket {
        fingerprint: fingerprint.clone(),
        packet,
    };
    match serde_json::to_string(&stored) {
        Ok(json) => {
            if let Err(e) = store.put(&key, &json).await {
                warn!(session_id = %state.session_id, error = %e, "Packet persistence failed");
                warnings.push(format!("packet persistence failed: {e}"));
            }
        }
        Err(e) => {
            warn!(session_id = %state.session_id, error = %e, "Packet serialization failed");
            warnings.push(format!("packet serialization failed: {e}"));
        }
    }

    let task_id = state.session_id.to_string();
    if let Err(e) = ledger.complete(&task_id).await {
        warn!(session_id = %state.session_id, error = %e, "Ledger completion failed");
        warnings.push(format!("ledger completion failed: {e}"));
    }

    info!(
        session_id = %state.session_id,
        fingerprint = fingerprint.as_str(),
        warning_count = warnings.len(),
        "Research packet published"
    );

    PublishOutcome {
        paper_id: stored.packet.paper_id,
        fingerprint,
        warnings,
        reused: false,
    }
}
