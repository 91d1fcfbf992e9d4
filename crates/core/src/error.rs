//! Error types for the orchestration engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the orchestration engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The session id has no project state. Fatal to the call, never retried.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The pipeline's event stream raised while being driven. Recorded as an
    /// error progress step before propagating; `self_heal` retries it up to
    /// the attempt budget.
    #[error("pipeline execution failed: {0}")]
    Pipeline(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
