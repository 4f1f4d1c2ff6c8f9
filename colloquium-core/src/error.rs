//! Error types for the Colloquium debate core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering session lifecycle, generation, evidence retrieval, storage, and
//! configuration domains.

use uuid::Uuid;

/// Top-level error type for the Colloquium core library.
#[derive(Debug, thiserror::Error)]
pub enum ColloquiumError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the session lifecycle and the graph executor.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Question rejected by gatekeeper: {reason}")]
    ValidationRejected { reason: String, suggestion: String },

    #[error("No documents found across {sources_queried} evidence sources")]
    NoSourcesFound { sources_queried: usize },

    #[error("Step '{step}' timed out after {timeout_secs}s")]
    StepTimeout { step: String, timeout_secs: u64 },

    #[error("Event sink stalled: {reason}")]
    SinkStalled { reason: StallReason },

    #[error("Session was cancelled")]
    Cancelled,

    #[error("Session not found: {session_id}")]
    NotFound { session_id: Uuid },
}

/// Why an event send into the sink could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// The consumer stopped draining and the bounded channel stayed full.
    Backpressure,
    /// The session was cancelled while a send was pending.
    Cancelled,
}

impl std::fmt::Display for StallReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StallReason::Backpressure => write!(f, "consumer backpressure"),
            StallReason::Cancelled => write!(f, "cancellation during send"),
        }
    }
}

/// Errors from generation backend interactions.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Backend connection failed: {message}")]
    Connection { message: String },

    #[error("Backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Backend response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Authentication failed for backend {backend}")]
    AuthFailed { backend: String },
}

/// Errors from evidence source queries.
///
/// `source` is the evidence source *name* (e.g. "openalex"), not an error
/// cause, so `Display`/`Error` are written by hand: `thiserror` would
/// otherwise treat a field named `source` as the `Error::source()` value
/// and require it to implement `Error`.
#[derive(Debug)]
pub enum EvidenceError {
    Connection {
        source: String,
        message: String,
    },

    Http {
        source: String,
        status: u16,
        message: String,
    },

    ResponseParse {
        source: String,
        message: String,
    },

    EmptyQuery,
}

impl std::fmt::Display for EvidenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceError::Connection { source, message } => {
                write!(f, "Connection to {source} failed: {message}")
            }
            EvidenceError::Http {
                source,
                status,
                message,
            } => {
                write!(f, "{source} returned HTTP {status}: {message}")
            }
            EvidenceError::ResponseParse { source, message } => {
                write!(f, "Could not parse {source} response: {message}")
            }
            EvidenceError::EmptyQuery => {
                write!(f, "Refusing to search with an empty query")
            }
        }
    }
}

impl std::error::Error for EvidenceError {}

/// Errors from the key-value store and the task ledger.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage connection failed: {message}")]
    Connection { message: String },

    #[error("Storage returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Storage serialization error: {message}")]
    Serialization { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {message}")]
    Load { message: String },

    #[error("Invalid configuration: {message}")]
    Validation { message: String },
}

/// A type alias for results using the top-level `ColloquiumError`.
pub type Result<T> = std::result::Result<T, ColloquiumError>;
