//! Collaborator interfaces and implementations.
//!
//! The debate core talks to the outside world through four narrow traits:
//! evidence sources, a generation backend, a key-value store, and a task
//! ledger. The core never names a concrete collaborator type; sessions
//! receive a [`Collaborators`] bundle and call through `Arc<dyn Trait>`
//! handles, so every implementation must be safe for concurrent use across
//! sessions.
//!
//! HTTP implementations live in the submodules; in-memory and mock
//! implementations for tests and offline runs live here.

pub mod generation;
pub mod knowledge_base;
pub mod openalex;
pub mod storage;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{EvidenceError, GenerationError, Result, StorageError};
use crate::state::Document;

pub use generation::OpenAiCompatBackend;
pub use knowledge_base::KnowledgeBaseSource;
pub use openalex::OpenAlexSource;
pub use storage::{HttpKvStore, HttpTaskLedger};

/// One external provider of scored evidence documents.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Source name used in logs and document provenance.
    fn name(&self) -> &str;

    /// Returns scored documents for a query.
    async fn search(&self, query: &str) -> std::result::Result<Vec<Document>, EvidenceError>;
}

/// A text-generation backend used by the validate, synthesize, challenge,
/// and query-refinement steps.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Human-readable backend name, used in logs.
    fn name(&self) -> &str;

    /// Performs a full completion for a prompt plus supporting context.
    async fn generate(
        &self,
        prompt: &str,
        context: &str,
    ) -> std::result::Result<String, GenerationError>;

    /// Streaming completion: segments go to `tx` as they are produced and
    /// the full text is returned at the end. The default implementation
    /// performs a full completion and forwards it as a single segment.
    async fn generate_streaming(
        &self,
        prompt: &str,
        context: &str,
        tx: mpsc::Sender<String>,
    ) -> std::result::Result<String, GenerationError> {
        let text = self.generate(prompt, context).await?;
        let _ = tx.send(text.clone()).await;
        Ok(text)
    }
}

/// A key-value document store used to persist research packets.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> std::result::Result<(), StorageError>;

    async fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError>;
}

/// A task registry tracking debate lifecycles. Both calls are best-effort;
/// failures are logged by callers, never fatal to a finished debate.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Registers a task before the debate starts.
    async fn begin(&self, task_id: &str) -> std::result::Result<(), StorageError>;

    /// Marks a task finished after publication.
    async fn complete(&self, task_id: &str) -> std::result::Result<(), StorageError>;
}

/// Shared handles to every external service a session needs.
///
/// Built once at startup and shared read-only across sessions.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Vec<Arc<dyn EvidenceSource>>,
    pub generation: Arc<dyn GenerationBackend>,
    pub store: Arc<dyn KvStore>,
    pub ledger: Arc<dyn TaskLedger>,
}

impl Collaborators {
    /// Builds the collaborator set described by the configuration.
    ///
    /// The academic works source is always present; the knowledge-base
    /// source, HTTP store, and HTTP ledger are attached only when their
    /// endpoints are configured, falling back to in-memory / no-op
    /// implementations otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut sources: Vec<Arc<dyn EvidenceSource>> =
            vec![Arc::new(OpenAlexSource::new(&config.evidence)?)];
        if config.evidence.knowledge_base_url.is_some() {
            sources.push(Arc::new(KnowledgeBaseSource::new(&config.evidence)?));
        }

        let generation: Arc<dyn GenerationBackend> =
            Arc::new(OpenAiCompatBackend::new(&config.generation)?);

        let store: Arc<dyn KvStore> = match config.storage.base_url {
            Some(_) => Arc::new(HttpKvStore::new(&config.storage)?),
            None => Arc::new(InMemoryKvStore::new()),
        };

        let ledger: Arc<dyn TaskLedger> = match config.ledger.base_url {
            Some(_) => Arc::new(HttpTaskLedger::new(&config.ledger)?),
            None => Arc::new(NoopTaskLedger),
        };

        Ok(Self {
            sources,
            generation,
            store,
            ledger,
        })
    }
}

/// An evidence source returning a fixed document list, for testing and
/// offline runs.
pub struct StaticEvidenceSource {
    name: String,
    documents: Vec<Document>,
}

impl StaticEvidenceSource {
    pub fn new(name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            documents,
        }
    }
}

#[async_trait]
impl EvidenceSource for StaticEvidenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str) -> std::result::Result<Vec<Document>, EvidenceError> {
        Ok(self.documents.clone())
    }
}

/// A mock generation backend for testing and development.
pub struct MockGenerationBackend {
    name: String,
    responses: std::sync::Mutex<Vec<String>>,
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self {
            name: "mock-backend".to_string(),
            responses: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a backend that always returns the given text.
    ///
    /// Queues multiple copies of the response so it can handle multiple calls.
    pub fn with_response(text: &str) -> Self {
        let backend = Self::new();
        for _ in 0..20 {
            backend.queue_response(text);
        }
        backend
    }

    /// Queue a response to be returned by the next `generate` call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push(text.into());
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _prompt: &str,
        _context: &str,
    ) -> std::result::Result<String, GenerationError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("Mock backend: no queued responses available.".to_string())
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// An in-memory key-value store for tests and local runs.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: tokio::sync::Mutex<HashMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }
}

/// A task ledger that records nothing, for runs without a registry.
pub struct NoopTaskLedger;

#[async_trait]
impl TaskLedger for NoopTaskLedger {
    async fn begin(&self, _task_id: &str) -> std::result::Result<(), StorageError> {
        Ok(())
    }

    async fn complete(&self, _task_id: &str) -> std::result::Result<(), StorageError> {
        Ok(())
    }
}
