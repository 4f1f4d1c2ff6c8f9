//! Debate state for a single research session.
//!
//! `ResearchState` is the one mutable record a session's graph executor
//! threads through every step. Everything a consumer can observe about a
//! finished debate (documents, criticisms, transcript, final answer) lives
//! here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::Decision;

/// Lifecycle status of a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The debate is still moving through the graph.
    Running,
    /// The debate finished and a paper was published.
    Completed,
    /// The debate stopped on an error or cancellation.
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A scored evidence document retrieved from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Name of the evidence source that produced this document.
    pub source: String,
    /// Text content used for synthesis and challenge.
    pub content: String,
    /// Source-assigned relevance score, higher is better.
    pub score: f64,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>, score: f64) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            score,
        }
    }
}

/// Which kind of gap a criticism points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticismTag {
    /// The draft lacks supporting evidence; more retrieval is needed.
    EvidenceGap,
    /// Evidence is adequate but the argument or presentation is weak.
    ReasoningGap,
}

impl std::fmt::Display for CriticismTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CriticismTag::EvidenceGap => write!(f, "evidence_gap"),
            CriticismTag::ReasoningGap => write!(f, "reasoning_gap"),
        }
    }
}

/// A single criticism raised by the challenger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criticism {
    pub text: String,
    pub tag: CriticismTag,
}

impl Criticism {
    pub fn evidence(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: CriticismTag::EvidenceGap,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: CriticismTag::ReasoningGap,
        }
    }
}

/// One append-only audit entry in the debate transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Which debate role acted (gatekeeper, retriever, challenger, ...).
    pub actor: String,
    /// What happened, in past tense.
    pub action: String,
    /// Optional free-form detail, e.g. a decision name or error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Full mutable state for one debate session.
///
/// Counters are written only by the graph executor; steps read state and
/// return their outputs for the executor to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub session_id: Uuid,
    pub original_question: String,
    /// Gatekeeper-refined question, set exactly once during validation.
    pub validated_question: Option<String>,
    pub documents: Vec<Document>,
    pub draft_answer: Option<String>,
    /// Criticisms from the most recent challenge pass. Replaced wholesale
    /// each pass, never appended across passes.
    pub criticisms: Vec<Criticism>,
    pub revision_count: u32,
    pub research_cycle_count: u32,
    pub transcript: Vec<TranscriptEntry>,
    /// Most recent orchestrator decision, if any.
    pub decision: Option<Decision>,
    /// Published answer. Non-empty exactly when `status` is `Completed`.
    pub final_answer: Option<String>,
    pub status: SessionStatus,
}

impl ResearchState {
    /// Creates a fresh session state around an unvalidated question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            original_question: question.into(),
            validated_question: None,
            documents: Vec::new(),
            draft_answer: None,
            criticisms: Vec::new(),
            revision_count: 0,
            research_cycle_count: 0,
            transcript: Vec::new(),
            decision: None,
            final_answer: None,
            status: SessionStatus::Running,
        }
    }

    /// The question steps should work from: the validated form when the
    /// gatekeeper has produced one, otherwise the original.
    pub fn question(&self) -> &str {
        self.validated_question
            .as_deref()
            .unwrap_or(&self.original_question)
    }

    /// Appends a transcript entry stamped with the current time.
    pub fn record(
        &mut self,
        actor: impl Into<String>,
        action: impl Into<String>,
        detail: Option<String>,
    ) {
        self.transcript.push(TranscriptEntry {
            actor: actor.into(),
            action: action.into(),
            detail,
            timestamp: Utc::now(),
        });
    }

    /// Marks the session completed. Returns false if the status was
    /// already terminal, in which case nothing changes.
    pub fn complete(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Completed;
        true
    }

    /// Marks the session failed. Returns false if the status was already
    /// terminal, in which case nothing changes.
    pub fn fail(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Failed;
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SessionStatus::Running
    }
}
