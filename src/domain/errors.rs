//! Domain errors for the OMC orchestration substrate.

use thiserror::Error;

/// Domain-level errors shared across the swarm, recovery, and hook subsystems.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Path escapes the worktree root: {0}")]
    PathEscape(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Swarm is not initialized; call connect or start first")]
    NotInitialized,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {0} is not in a failed state")]
    TaskNotFailed(String),

    #[error("Task {task_id} is not owned by agent {agent_id}")]
    NotOwned { task_id: String, agent_id: String },

    #[error("Mode '{mode}' is already active (held by {holder})")]
    ModeInUse { mode: String, holder: String },

    #[error("Cannot start a swarm with an empty task list")]
    EmptyTaskList,

    #[error("Invalid agent count: {0}. Must be at least 1")]
    InvalidAgentCount(usize),

    #[error("Recovery attempts exhausted for session {session_id} ({error_type})")]
    RecoveryExhausted {
        session_id: String,
        error_type: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::IoError(err.to_string())
    }
}
