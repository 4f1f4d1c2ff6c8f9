//! Typed progress events and the per-session event sink.
//!
//! Every observable moment of a debate (validation, retrieval counts, draft
//! tokens, decisions, terminal outcomes) crosses the boundary as one
//! `EventRecord` with a stable wire shape:
//!
//! ```json
//! { "event_type": "...", "data": { ... }, "sequence_number": 3, "timestamp": 1700000000.5 }
//! ```
//!
//! The sink is a bounded `tokio::mpsc` channel per session. It never blocks
//! the executor forever: a full buffer fails the send after a configured
//! timeout, and a dropped receiver flips the sink into detached mode so the
//! session can still run to completion and persist its result.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decision::Decision;
use crate::error::{SessionError, StallReason};

/// A progress or content event produced while a debate runs.
///
/// Field names are part of the wire contract; do not rename them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum ResearchEvent {
    ResearchStarted {
        question: String,
        task_id: String,
    },
    QuestionValidated {
        validated_question: String,
    },
    ValidationError {
        error: String,
        suggestion: String,
    },
    DocumentsRetrieved {
        document_count: usize,
    },
    /// Advisory partial-draft content. Never consumed by the decision rules.
    DraftAnswerToken {
        token: String,
    },
    DraftGenerated {
        draft_length: usize,
    },
    CriticismsReceived {
        criticism_count: usize,
    },
    OrchestratorDecision {
        decision: Decision,
    },
    ResearchCompleted {
        final_answer: String,
    },
    ResearchFailed {
        error: String,
    },
    PaperGenerated {
        paper_id: String,
        paper_content: String,
    },
    Error {
        error: String,
    },
}

impl ResearchEvent {
    /// Stable wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            ResearchEvent::ResearchStarted { .. } => "research_started",
            ResearchEvent::QuestionValidated { .. } => "question_validated",
            ResearchEvent::ValidationError { .. } => "validation_error",
            ResearchEvent::DocumentsRetrieved { .. } => "documents_retrieved",
            ResearchEvent::DraftAnswerToken { .. } => "draft_answer_token",
            ResearchEvent::DraftGenerated { .. } => "draft_generated",
            ResearchEvent::CriticismsReceived { .. } => "criticisms_received",
            ResearchEvent::OrchestratorDecision { .. } => "orchestrator_decision",
            ResearchEvent::ResearchCompleted { .. } => "research_completed",
            ResearchEvent::ResearchFailed { .. } => "research_failed",
            ResearchEvent::PaperGenerated { .. } => "paper_generated",
            ResearchEvent::Error { .. } => "error",
        }
    }

    /// Whether a consumer should stop reading after this event.
    ///
    /// `research_completed` is not terminal: `paper_generated` still follows
    /// it on the success path.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResearchEvent::PaperGenerated { .. }
                | ResearchEvent::ValidationError { .. }
                | ResearchEvent::ResearchFailed { .. }
                | ResearchEvent::Error { .. }
        )
    }

    /// Token events are advisory and excluded from transcript accounting.
    pub fn is_token(&self) -> bool {
        matches!(self, ResearchEvent::DraftAnswerToken { .. })
    }
}

/// One sequenced, timestamped event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(flatten)]
    pub event: ResearchEvent,
    /// Monotonic per-session counter, starting at 0.
    pub sequence_number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Producer half of a session's event channel.
///
/// Owned by the graph executor; exactly one task emits into it, which is
/// what makes the sequence numbers and ordering guarantees trivial to keep.
pub struct EventSink {
    tx: mpsc::Sender<EventRecord>,
    send_timeout: Duration,
    cancel: CancellationToken,
    sequence: AtomicU64,
    detached: AtomicBool,
}

impl EventSink {
    /// Creates a sink and its consumer half.
    pub fn bounded(
        capacity: usize,
        send_timeout: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                send_timeout,
                cancel,
                sequence: AtomicU64::new(0),
                detached: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// True once the consumer has been observed gone; further emissions are
    /// dropped silently.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }

    /// Sequences, timestamps, and delivers one event.
    ///
    /// A full buffer fails with `SinkStalled` after `send_timeout`; a
    /// dropped receiver detaches the sink and returns `Ok`, since an absent
    /// consumer must not abort the debate.
    pub async fn emit(&self, event: ResearchEvent) -> std::result::Result<(), SessionError> {
        let record = EventRecord {
            sequence_number: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: epoch_seconds(),
            event,
        };

        if self.detached.load(Ordering::Relaxed) {
            debug!(
                event_type = record.event.event_type(),
                "sink detached, dropping event"
            );
            return Ok(());
        }

        match tokio::time::timeout(self.send_timeout, self.tx.send(record)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                self.detached.store(true, Ordering::Relaxed);
                warn!("event consumer disconnected, continuing detached");
                Ok(())
            }
            Err(_) => {
                let reason = if self.cancel.is_cancelled() {
                    StallReason::Cancelled
                } else {
                    StallReason::Backpressure
                };
                Err(SessionError::SinkStalled { reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sink(capacity: usize, timeout_ms: u64) -> (EventSink, mpsc::Receiver<EventRecord>) {
        EventSink::bounded(
            capacity,
            Duration::from_millis(timeout_ms),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_event_wire_format() {
        let record = EventRecord {
            event: ResearchEvent::QuestionValidated {
                validated_question: "What limits battery density?".into(),
            },
            sequence_number: 1,
            timestamp: 1_700_000_000.25,
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event_type"], "question_validated");
        assert_eq!(
            json["data"]["validated_question"],
            "What limits battery density?"
        );
        assert_eq!(json["sequence_number"], 1);
        assert_eq!(json["timestamp"], 1_700_000_000.25);
    }

    #[test]
    fn test_event_wire_roundtrip() {
        let record = EventRecord {
            event: ResearchEvent::PaperGenerated {
                paper_id: "abc123".into(),
                paper_content: "final answer".into(),
            },
            sequence_number: 7,
            timestamp: 42.0,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_decision_event_payload() {
        let event = ResearchEvent::OrchestratorDecision {
            decision: Decision::ResearchAgain,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "orchestrator_decision");
        assert_eq!(json["data"]["decision"], "RESEARCH_AGAIN");
    }

    #[test]
    fn test_event_type_names_match_serialization() {
        let events = vec![
            ResearchEvent::ResearchStarted {
                question: "q".into(),
                task_id: "t".into(),
            },
            ResearchEvent::DocumentsRetrieved { document_count: 5 },
            ResearchEvent::DraftAnswerToken { token: "x".into() },
            ResearchEvent::DraftGenerated { draft_length: 10 },
            ResearchEvent::CriticismsReceived { criticism_count: 0 },
            ResearchEvent::ResearchFailed {
                error: "boom".into(),
            },
        ];
        for event in events {
            let json: serde_json::Value = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event_type"], event.event_type());
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert!(ResearchEvent::PaperGenerated {
            paper_id: "p".into(),
            paper_content: "c".into(),
        }
        .is_terminal());
        assert!(ResearchEvent::ValidationError {
            error: "e".into(),
            suggestion: "s".into(),
        }
        .is_terminal());
        assert!(ResearchEvent::ResearchFailed { error: "e".into() }.is_terminal());
        assert!(ResearchEvent::Error { error: "e".into() }.is_terminal());

        // Completion is followed by paper_generated, so it must not close
        // the stream early.
        assert!(!ResearchEvent::ResearchCompleted {
            final_answer: "a".into(),
        }
        .is_terminal());
        assert!(!ResearchEvent::DraftAnswerToken { token: "t".into() }.is_terminal());
    }

    #[tokio::test]
    async fn test_sink_preserves_order_and_sequence() {
        let (sink, mut rx) = sink(8, 50);
        sink.emit(ResearchEvent::DocumentsRetrieved { document_count: 1 })
            .await
            .unwrap();
        sink.emit(ResearchEvent::DraftGenerated { draft_length: 2 })
            .await
            .unwrap();
        sink.emit(ResearchEvent::CriticismsReceived { criticism_count: 3 })
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.sequence_number, 0);
        assert_eq!(second.sequence_number, 1);
        assert_eq!(third.sequence_number, 2);
        assert_eq!(first.event.event_type(), "documents_retrieved");
        assert_eq!(second.event.event_type(), "draft_generated");
        assert_eq!(third.event.event_type(), "criticisms_received");
        assert!(first.timestamp <= second.timestamp);
    }

    #[tokio::test]
    async fn test_sink_backpressure_stalls() {
        let (sink, _rx) = sink(1, 10);
        sink.emit(ResearchEvent::DocumentsRetrieved { document_count: 1 })
            .await
            .unwrap();
        // Buffer full and nobody draining.
        let err = sink
            .emit(ResearchEvent::DraftGenerated { draft_length: 1 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::SinkStalled {
                reason: StallReason::Backpressure
            }
        ));
    }

    #[tokio::test]
    async fn test_sink_stall_reports_cancellation() {
        let cancel = CancellationToken::new();
        let (sink, _rx) = EventSink::bounded(1, Duration::from_millis(10), cancel.clone());
        sink.emit(ResearchEvent::DocumentsRetrieved { document_count: 1 })
            .await
            .unwrap();
        cancel.cancel();
        let err = sink
            .emit(ResearchEvent::DraftGenerated { draft_length: 1 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::SinkStalled {
                reason: StallReason::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn test_sink_detaches_on_dropped_receiver() {
        let (sink, rx) = sink(4, 50);
        drop(rx);
        assert!(!sink.is_detached());
        sink.emit(ResearchEvent::DocumentsRetrieved { document_count: 1 })
            .await
            .unwrap();
        assert!(sink.is_detached());
        // Subsequent emissions stay no-ops.
        sink.emit(ResearchEvent::DraftGenerated { draft_length: 1 })
            .await
            .unwrap();
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (sink, _rx) = sink(0, 10);
        assert!(!sink.is_detached());
    }
}
