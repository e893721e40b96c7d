//! Error types for the job system.

use conversion_router::EngineError;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job {id} cannot be cancelled in state {status}")]
    NotCancelable { id: String, status: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Job manager is shutting down")]
    ShuttingDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Why a running job was told to stop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aborted {
    #[error("Conversion cancelled by user")]
    Cancelled,

    #[error("Conversion timed out after {secs}s")]
    TimedOut { secs: u64 },
}

/// Error a conversion task may return.
///
/// Every variant ends the job as failed, unless the job was cancelled while
/// the task ran.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Aborted(#[from] Aborted),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl TaskError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
