//! # Colloquium Core
//!
//! Core library for the Colloquium research debate engine.
//! Provides the debate graph executor, session host, streaming event
//! contract, collaborator interfaces, decision logic, and configuration.

pub mod collab;
pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod executor;
pub mod session;
pub mod state;
pub mod steps;

// Re-export commonly used types at the crate root.
pub use collab::{
    Collaborators, EvidenceSource, GenerationBackend, InMemoryKvStore, KvStore,
    MockGenerationBackend, NoopTaskLedger, StaticEvidenceSource, TaskLedger,
};
pub use config::{ClassifierKind, Config, OrchestratorConfig, load_config};
pub use decision::{
    ClassificationPolicy, Decision, DecisionOutcome, KeywordPolicy, LoopLimits, PrefixPolicy,
    decide,
};
pub use error::{ColloquiumError, Result, SessionError};
pub use events::{EventRecord, EventSink, ResearchEvent};
pub use executor::{GraphExecutor, GraphNode};
pub use session::{SessionHandle, SessionHost, SessionInfo};
pub use state::{Criticism, CriticismTag, Document, ResearchState, SessionStatus, TranscriptEntry};
pub use steps::publish::{PublishOutcome, ResearchPacket};
