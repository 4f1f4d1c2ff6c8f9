//! Session host: spawns debate executors and tracks live sessions.
//!
//! One tokio task per session drives the graph executor; the caller holds a
//! [`SessionHandle`] for draining events, cancelling, and joining. Sessions
//! deregister themselves when their executor finishes, whatever the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::collab::Collaborators;
use crate::config::Config;
use crate::decision::ClassificationPolicy;
use crate::error::SessionError;
use crate::events::{EventRecord, EventSink};
use crate::executor::GraphExecutor;
use crate::state::ResearchState;

/// Registry view of one live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub question: String,
    pub started_at: DateTime<Utc>,
}

struct SessionEntry {
    info: SessionInfo,
    cancel: CancellationToken,
}

/// Creates sessions and tracks the live ones.
///
/// Collaborators and the classification policy are shared read-only across
/// every session the host spawns.
pub struct SessionHost {
    collab: Collaborators,
    policy: Arc<dyn ClassificationPolicy>,
    config: Config,
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
}

impl SessionHost {
    /// Builds a host using the classification policy named in the config.
    pub fn new(collab: Collaborators, config: Config) -> Self {
        let policy = config.orchestrator.classifier.policy();
        Self::with_policy(collab, config, policy)
    }

    /// Builds a host with an injected classification policy.
    pub fn with_policy(
        collab: Collaborators,
        config: Config,
        policy: Arc<dyn ClassificationPolicy>,
    ) -> Self {
        Self {
            collab,
            policy,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawns an executor task for a question and returns its handle.
    pub async fn start_session(&self, question: impl Into<String>) -> SessionHandle {
        let question = question.into();
        let state = ResearchState::new(question.clone());
        let session_id = state.session_id;
        let cancel = CancellationToken::new();

        let (sink, events) = EventSink::bounded(
            self.config.orchestrator.sink_capacity,
            self.config.orchestrator.sink_send_timeout(),
            cancel.clone(),
        );
        let executor = GraphExecutor::new(
            self.collab.clone(),
            Arc::clone(&self.policy),
            &self.config.orchestrator,
            sink,
            cancel.clone(),
        );

        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                session_id,
                SessionEntry {
                    info: SessionInfo {
                        session_id,
                        question,
                        started_at: Utc::now(),
                    },
                    cancel: cancel.clone(),
                },
            );
        }
        info!(session_id = %session_id, "Session registered");

        let sessions = Arc::clone(&self.sessions);
        let task = tokio::spawn(async move {
            let state = executor.run(state).await;
            sessions.lock().await.remove(&state.session_id);
            debug!(
                session_id = %state.session_id,
                status = %state.status,
                "Session deregistered"
            );
            state
        });

        SessionHandle {
            session_id,
            events,
            task,
            cancel,
        }
    }

    /// Requests cancellation of a live session. The executor observes the
    /// token between steps, so teardown is not immediate.
    pub async fn cancel(&self, session_id: Uuid) -> Result<(), SessionError> {
        let sessions = self.sessions.lock().await;
        match sessions.get(&session_id) {
            Some(entry) => {
                entry.cancel.cancel();
                Ok(())
            }
            None => Err(SessionError::NotFound { session_id }),
        }
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }
}

/// Caller-side handle to one running session.
pub struct SessionHandle {
    session_id: Uuid,
    events: mpsc::Receiver<EventRecord>,
    task: JoinHandle<ResearchState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Next event, or `None` once the session has finished and the stream
    /// is drained.
    pub async fn next_event(&mut self) -> Option<EventRecord> {
        self.events.recv().await
    }

    /// Requests cancellation of this session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the executor task and returns the final state.
    pub async fn join(self) -> crate::error::Result<ResearchState> {
        self.task
            .await
            .map_err(|e| std::io::Error::other(e).into())
    }

    /// Splits the handle so events can be drained independently of joining.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<EventRecord>,
        JoinHandle<ResearchState>,
        CancellationToken,
    ) {
        (self.events, self.task, self.cancel)
    }
}
