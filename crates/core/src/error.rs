//! Error types for the Reflace domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] aggregates them.

use thiserror::Error;

/// The top-level error type for all Reflace operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transcript invariants ---
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Model client (retries exhausted) ---
    #[error("Model request error: {0}")]
    Model(#[from] ModelError),

    // --- Environment ---
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    // --- Insight store ---
    #[error("Playbook error: {0}")]
    Playbook(#[from] PlaybookError),

    // --- Response shape ---
    #[error("Unexpected response during {stage}: {reason}")]
    UnexpectedResponse { stage: String, reason: String },

    #[error("Unexpected tool call during {stage}: a plain-text response is required")]
    UnexpectedToolCall { stage: String },

    // --- Unimplemented modes ---
    #[error("Unsupported: {0}")]
    Unsupported(String),

    // --- Configuration ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization / IO ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A transcript invariant was violated. Always fatal to the current trial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("tool result for '{got}' does not match pending invocation '{expected}'")]
    MismatchedResult { expected: String, got: String },

    #[error("tool result for '{0}' has no pending invocation")]
    UnexpectedResult(String),

    #[error("invocation '{0}' is still awaiting its result")]
    PendingInvocation(String),

    #[error("invocation id '{0}' was already used in this transcript")]
    DuplicateInvocation(String),

    #[error("tool-call response carried no invocations")]
    EmptyToolCalls,

    #[error("malformed turn record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

/// Failures reported by the model client.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ModelError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// Failures raised by the task environment.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("Action failed to execute: {0}")]
    Execution(String),

    #[error("Environment is not initialized: {0}")]
    NotInitialized(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Failed to release environment: {0}")]
    Close(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

/// Failures raised by the Insight Store.
#[derive(Debug, Clone, Error)]
pub enum PlaybookError {
    #[error("Insight not found: {0}")]
    NotFound(String),

    #[error("Unknown playbook section: {0}")]
    UnknownSection(String),

    #[error("Insight text must not be empty")]
    EmptyText,

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures raised by the embedding collaborator.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Failed(String),

    #[error("embedding came back empty for input of {0} chars")]
    Empty(usize),

    #[error("embedding has a non-finite component at index {0}")]
    NonFinite(usize),
}
