//! The debate graph executor.
//!
//! Drives one session through the closed step graph
//! Validate -> Retrieve -> Synthesize -> Challenge -> Decide, looping back to
//! Synthesize or Retrieve until a Finalize decision routes it to Publish.
//! The executor is the only writer of session state: steps return outputs,
//! the executor applies them, appends the matching transcript entry, and
//! emits the paired event. Every non-token event therefore has exactly one
//! transcript entry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collab::Collaborators;
use crate::config::OrchestratorConfig;
use crate::decision::{ClassificationPolicy, Decision, LoopLimits, decide};
use crate::error::{ColloquiumError, SessionError};
use crate::events::{EventSink, ResearchEvent};
use crate::state::ResearchState;
use crate::steps;

/// The closed set of graph nodes. There is no generic graph engine; the
/// debate shape is this enum plus [`GraphNode::successor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    Validate,
    Retrieve,
    Synthesize,
    Challenge,
    Decide,
    Publish,
}

impl GraphNode {
    pub fn name(&self) -> &'static str {
        match self {
            GraphNode::Validate => "validate",
            GraphNode::Retrieve => "retrieve",
            GraphNode::Synthesize => "synthesize",
            GraphNode::Challenge => "challenge",
            GraphNode::Decide => "decide",
            GraphNode::Publish => "publish",
        }
    }

    /// The next node in the walk. `decision` is only read leaving `Decide`.
    pub fn successor(&self, decision: Option<Decision>) -> Option<GraphNode> {
        match self {
            GraphNode::Validate => Some(GraphNode::Retrieve),
            GraphNode::Retrieve => Some(GraphNode::Synthesize),
            GraphNode::Synthesize => Some(GraphNode::Challenge),
            GraphNode::Challenge => Some(GraphNode::Decide),
            GraphNode::Decide => match decision {
                Some(Decision::Finalize) => Some(GraphNode::Publish),
                Some(Decision::Revise) => Some(GraphNode::Synthesize),
                Some(Decision::ResearchAgain) => Some(GraphNode::Retrieve),
                None => None,
            },
            GraphNode::Publish => None,
        }
    }
}

/// Runs one research session to a terminal status.
pub struct GraphExecutor {
    collab: Collaborators,
    policy: Arc<dyn ClassificationPolicy>,
    limits: LoopLimits,
    step_timeout: Duration,
    sink: EventSink,
    cancel: CancellationToken,
}

impl GraphExecutor {
    pub fn new(
        collab: Collaborators,
        policy: Arc<dyn ClassificationPolicy>,
        orchestrator: &OrchestratorConfig,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            collab,
            policy,
            limits: orchestrator.loop_limits(),
            step_timeout: orchestrator.step_timeout(),
            sink,
            cancel,
        }
    }

    /// Drives the session until `state.status` is terminal and returns the
    /// final state. Never panics out of the session task: every failure is
    /// converted into a terminal event plus `Failed` status.
    pub async fn run(self, mut state: ResearchState) -> ResearchState {
        info!(
            session_id = %state.session_id,
            question = state.original_question.as_str(),
            "Research session starting"
        );

        let question = state.original_question.clone();
        let started = ResearchEvent::ResearchStarted {
            question: question.clone(),
            task_id: state.session_id.to_string(),
        };
        if let Err(e) = self
            .transcribe(&mut state, "host", "research started", Some(question), started)
            .await
        {
            self.fail_session(&mut state, e.into()).await;
            return state;
        }

        // Best-effort task registration; a missing ledger never blocks a run.
        if let Err(e) = self
            .collab
            .ledger
            .begin(&state.session_id.to_string())
            .await
        {
            warn!(session_id = %state.session_id, error = %e, "Task ledger registration failed");
        }

        let mut node = GraphNode::Validate;
        loop {
            // Cancellation is observed between steps, never inside one.
            if self.cancel.is_cancelled() {
                self.fail_session(&mut state, SessionError::Cancelled.into())
                    .await;
                return state;
            }

            match self.execute_node(node, &mut state).await {
                Ok(Some(next)) => node = next,
                Ok(None) => return state,
                Err(e) => {
                    self.fail_session(&mut state, e).await;
                    return state;
                }
            }
        }
    }

    async fn execute_node(
        &self,
        node: GraphNode,
        state: &mut ResearchState,
    ) -> crate::error::Result<Option<GraphNode>> {
        debug!(session_id = %state.session_id, step = node.name(), "Executing step");
        match node {
            GraphNode::Validate => {
                let validated = self
                    .step(
                        node,
                        steps::validate::run(
                            &state.original_question,
                            self.collab.generation.as_ref(),
                        ),
                    )
                    .await?;
                state.validated_question = Some(validated.clone());
                self.transcribe(
                    state,
                    "gatekeeper",
                    "question validated",
                    Some(validated.clone()),
                    ResearchEvent::QuestionValidated {
                        validated_question: validated,
                    },
                )
                .await?;
                Ok(node.successor(None))
            }
            GraphNode::Retrieve => {
                let documents = self
                    .step(
                        node,
                        steps::retrieve::run(
                            state,
                            &self.collab.sources,
                            self.collab.generation.as_ref(),
                        ),
                    )
                    .await?;
                let document_count = documents.len();
                state.documents = documents;
                self.transcribe(
                    state,
                    "retriever",
                    "documents retrieved",
                    Some(format!("{document_count} documents")),
                    ResearchEvent::DocumentsRetrieved { document_count },
                )
                .await?;
                Ok(node.successor(None))
            }
            GraphNode::Synthesize => {
                let draft = self
                    .step(
                        node,
                        steps::synthesize::run(state, &self.collab.generation, &self.sink),
                    )
                    .await?;
                let action = if state.criticisms.is_empty() {
                    "draft written"
                } else {
                    "draft revised"
                };
                let draft_length = draft.len();
                state.draft_answer = Some(draft);
                // Criticisms are consumed by the rewrite they provoked.
                state.criticisms.clear();
                self.transcribe(
                    state,
                    "synthesizer",
                    action,
                    Some(format!("{draft_length} characters")),
                    ResearchEvent::DraftGenerated { draft_length },
                )
                .await?;
                Ok(node.successor(None))
            }
            GraphNode::Challenge => {
                let criticisms = self
                    .step(
                        node,
                        steps::challenge::run(
                            state,
                            self.collab.generation.as_ref(),
                            self.policy.as_ref(),
                        ),
                    )
                    .await?;
                let criticism_count = criticisms.len();
                state.criticisms = criticisms;
                self.transcribe(
                    state,
                    "challenger",
                    "criticisms received",
                    Some(format!("{criticism_count} criticisms")),
                    ResearchEvent::CriticismsReceived { criticism_count },
                )
                .await?;
                Ok(node.successor(None))
            }
            GraphNode::Decide => {
                let outcome = decide(
                    &state.criticisms,
                    state.revision_count,
                    state.research_cycle_count,
                    self.limits,
                );
                state.decision = Some(outcome.decision);
                let action = if outcome.loop_guard {
                    info!(
                        session_id = %state.session_id,
                        revision_count = state.revision_count,
                        research_cycle_count = state.research_cycle_count,
                        "Loop ceiling reached, forcing finalize"
                    );
                    "decision (loop guard)"
                } else {
                    "decision"
                };
                self.transcribe(
                    state,
                    "orchestrator",
                    action,
                    Some(outcome.decision.to_string()),
                    ResearchEvent::OrchestratorDecision {
                        decision: outcome.decision,
                    },
                )
                .await?;
                match outcome.decision {
                    Decision::Revise => state.revision_count += 1,
                    Decision::ResearchAgain => state.research_cycle_count += 1,
                    Decision::Finalize => {}
                }
                Ok(node.successor(Some(outcome.decision)))
            }
            GraphNode::Publish => {
                let outcome = self
                    .step(node, async {
                        Ok(steps::publish::run(state, &self.collab.store, &self.collab.ledger)
                            .await)
                    })
                    .await?;
                let final_answer = state.draft_answer.clone().unwrap_or_default();
                self.transcribe(
                    state,
                    "host",
                    "research completed",
                    None,
                    ResearchEvent::ResearchCompleted {
                        final_answer: final_answer.clone(),
                    },
                )
                .await?;
                let detail = if outcome.warnings.is_empty() {
                    format!("fingerprint {}", outcome.fingerprint)
                } else {
                    format!(
                        "fingerprint {}; warnings: {}",
                        outcome.fingerprint,
                        outcome.warnings.join("; ")
                    )
                };
                self.transcribe(
                    state,
                    "publisher",
                    "paper generated",
                    Some(detail),
                    ResearchEvent::PaperGenerated {
                        paper_id: outcome.paper_id.to_string(),
                        paper_content: final_answer.clone(),
                    },
                )
                .await?;
                // Set after the last fallible emit, so a failure on the way
                // out cannot leave a final answer on a Failed session.
                state.final_answer = Some(final_answer);
                state.complete();
                info!(session_id = %state.session_id, "Research session completed");
                Ok(None)
            }
        }
    }

    /// Runs one step future under the configured deadline.
    async fn step<F, T>(&self, node: GraphNode, fut: F) -> crate::error::Result<T>
    where
        F: Future<Output = crate::error::Result<T>>,
    {
        match tokio::time::timeout(self.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::StepTimeout {
                step: node.name().to_string(),
                timeout_secs: self.step_timeout.as_secs(),
            }
            .into()),
        }
    }

    /// Appends a transcript entry and emits its paired event.
    async fn transcribe(
        &self,
        state: &mut ResearchState,
        actor: &str,
        action: &str,
        detail: Option<String>,
        event: ResearchEvent,
    ) -> Result<(), SessionError> {
        state.record(actor, action, detail);
        self.sink.emit(event).await
    }

    /// Converts any error into the session's single terminal transition.
    async fn fail_session(&self, state: &mut ResearchState, error: ColloquiumError) {
        if state.is_terminal() {
            warn!(
                session_id = %state.session_id,
                error = %error,
                "Error after terminal status, ignoring"
            );
            return;
        }
        warn!(session_id = %state.session_id, error = %error, "Research session failed");

        let (actor, action, detail, event) = match &error {
            ColloquiumError::Session(SessionError::ValidationRejected { reason, suggestion }) => (
                "gatekeeper",
                "question rejected",
                Some(reason.clone()),
                ResearchEvent::ValidationError {
                    error: reason.clone(),
                    suggestion: suggestion.clone(),
                },
            ),
            ColloquiumError::Session(session) => (
                "host",
                "research failed",
                Some(session.to_string()),
                ResearchEvent::ResearchFailed {
                    error: session.to_string(),
                },
            ),
            other => (
                "host",
                "error",
                Some(other.to_string()),
                ResearchEvent::Error {
                    error: other.to_string(),
                },
            ),
        };
        state.record(actor, action, detail);

        // A stalled sink cannot take the terminal event either.
        let stalled = matches!(
            &error,
            ColloquiumError::Session(SessionError::SinkStalled { .. })
        );
        if !stalled && let Err(emit_err) = self.sink.emit(event).await {
            warn!(
                session_id = %state.session_id,
                error = %emit_err,
                "Terminal event emission failed"
            );
        }
        state.fail();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{
        GenerationBackend, InMemoryKvStore, MockGenerationBackend, NoopTaskLedger,
        StaticEvidenceSource,
    };
    use crate::decision::PrefixPolicy;
    use crate::error::GenerationError;
    use crate::events::EventRecord;
    use crate::state::{Document, SessionStatus};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    struct SlowBackend;

    #[async_trait]
    impl GenerationBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _p: &str, _c: &str) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".into())
        }
    }

    fn executor_with(
        backend: Arc<dyn GenerationBackend>,
        limits: LoopLimits,
        step_timeout: Duration,
    ) -> (GraphExecutor, mpsc::Receiver<EventRecord>, CancellationToken) {
        let cancel = CancellationToken::new();
        let (sink, rx) = EventSink::bounded(256, Duration::from_millis(100), cancel.clone());
        let collab = Collaborators {
            sources: vec![Arc::new(StaticEvidenceSource::new(
                "fixture",
                vec![Document::new("fixture", "some evidence", 0.8)],
            ))],
            generation: backend,
            store: Arc::new(InMemoryKvStore::new()),
            ledger: Arc::new(NoopTaskLedger),
        };
        let executor = GraphExecutor {
            collab,
            policy: Arc::new(PrefixPolicy::default()),
            limits,
            step_timeout,
            sink,
            cancel: cancel.clone(),
        };
        (executor, rx, cancel)
    }

    fn approving_backend() -> MockGenerationBackend {
        let backend = MockGenerationBackend::new();
        backend.queue_response("APPROVED: yes\nQUESTION: A precise question?\nSUGGESTION:");
        backend
    }

    #[test]
    fn test_node_names() {
        assert_eq!(GraphNode::Validate.name(), "validate");
        assert_eq!(GraphNode::Decide.name(), "decide");
        assert_eq!(GraphNode::Publish.name(), "publish");
    }

    #[test]
    fn test_successor_table() {
        assert_eq!(
            GraphNode::Validate.successor(None),
            Some(GraphNode::Retrieve)
        );
        assert_eq!(
            GraphNode::Retrieve.successor(None),
            Some(GraphNode::Synthesize)
        );
        assert_eq!(
            GraphNode::Synthesize.successor(None),
            Some(GraphNode::Challenge)
        );
        assert_eq!(GraphNode::Challenge.successor(None), Some(GraphNode::Decide));
        assert_eq!(
            GraphNode::Decide.successor(Some(Decision::Finalize)),
            Some(GraphNode::Publish)
        );
        assert_eq!(
            GraphNode::Decide.successor(Some(Decision::Revise)),
            Some(GraphNode::Synthesize)
        );
        assert_eq!(
            GraphNode::Decide.successor(Some(Decision::ResearchAgain)),
            Some(GraphNode::Retrieve)
        );
        assert_eq!(GraphNode::Publish.successor(None), None);
    }

    #[tokio::test]
    async fn test_happy_path_completes() {
        let backend = approving_backend();
        backend.queue_response("Evidence shows the answer is X.");
        backend.queue_response("NONE");
        let (executor, _rx, _cancel) = executor_with(
            Arc::new(backend),
            LoopLimits {
                max_revisions: 3,
                max_research_cycles: 2,
            },
            Duration::from_secs(5),
        );

        let state = executor.run(ResearchState::new("what is x")).await;
        assert_eq!(state.status, SessionStatus::Completed);
        assert_eq!(
            state.final_answer.as_deref(),
            Some("Evidence shows the answer is X.")
        );
        assert_eq!(state.decision, Some(Decision::Finalize));
        assert_eq!(state.revision_count, 0);
        assert_eq!(state.research_cycle_count, 0);
        assert!(state.criticisms.is_empty());
    }

    #[tokio::test]
    async fn test_loop_guard_is_visible_in_transcript() {
        let backend = approving_backend();
        backend.queue_response("A draft.");
        backend.queue_response("- [reasoning] still weak");
        // Zero ceilings force the very first decision.
        let (executor, _rx, _cancel) = executor_with(
            Arc::new(backend),
            LoopLimits {
                max_revisions: 0,
                max_research_cycles: 0,
            },
            Duration::from_secs(5),
        );

        let state = executor.run(ResearchState::new("q")).await;
        assert_eq!(state.status, SessionStatus::Completed);
        assert!(
            state
                .transcript
                .iter()
                .any(|entry| entry.action == "decision (loop guard)")
        );
        assert!(!state.transcript.iter().any(|entry| entry.action == "decision"));
    }

    #[tokio::test]
    async fn test_step_timeout_fails_session() {
        let (executor, _rx, _cancel) = executor_with(
            Arc::new(SlowBackend),
            LoopLimits {
                max_revisions: 3,
                max_research_cycles: 2,
            },
            Duration::from_millis(50),
        );

        let state = executor.run(ResearchState::new("q")).await;
        assert_eq!(state.status, SessionStatus::Failed);
        assert_eq!(state.final_answer, None);
        let last = state.transcript.last().unwrap();
        assert_eq!(last.action, "research failed");
        assert!(last.detail.as_deref().unwrap().contains("'validate'"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_session_fails_cleanly() {
        let (executor, mut rx, cancel) = executor_with(
            Arc::new(approving_backend()),
            LoopLimits {
                max_revisions: 3,
                max_research_cycles: 2,
            },
            Duration::from_secs(5),
        );
        cancel.cancel();

        let state = executor.run(ResearchState::new("q")).await;
        assert_eq!(state.status, SessionStatus::Failed);
        assert_eq!(state.transcript.len(), 2);

        assert_eq!(
            rx.recv().await.unwrap().event.event_type(),
            "research_started"
        );
        let terminal = rx.recv().await.unwrap();
        assert_eq!(terminal.event.event_type(), "research_failed");
        assert!(terminal.event.is_terminal());
    }

    #[tokio::test]
    async fn test_validation_rejection_emits_validation_error() {
        let backend = MockGenerationBackend::new();
        backend.queue_response("APPROVED: no\nQUESTION:\nSUGGESTION: Narrow the scope.");
        let (executor, mut rx, _cancel) = executor_with(
            Arc::new(backend),
            LoopLimits {
                max_revisions: 3,
                max_research_cycles: 2,
            },
            Duration::from_secs(5),
        );

        let state = executor.run(ResearchState::new("vague??")).await;
        assert_eq!(state.status, SessionStatus::Failed);
        assert!(state.documents.is_empty());
        assert!(
            state
                .transcript
                .iter()
                .any(|entry| entry.action == "question rejected")
        );

        rx.recv().await.unwrap(); // research_started
        let terminal = rx.recv().await.unwrap();
        match terminal.event {
            ResearchEvent::ValidationError { suggestion, .. } => {
                assert_eq!(suggestion, "Narrow the scope.");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
