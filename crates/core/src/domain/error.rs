// Domain-level errors and the task error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("stage {stage} is not the current stage (expected {expected})")]
    StaleStage { stage: i64, expected: i64 },
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Classification of a task/handler failure. Mirrors the taxonomy handlers
/// and the janitor are required to produce; not every kind is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Transient,
    Permanent,
    InvalidInput,
    Timeout,
    Canceled,
    HandlerNotFound,
    HeartbeatTimeout,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::Permanent => "PERMANENT",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Canceled => "CANCELED",
            ErrorKind::HandlerNotFound => "HANDLER_NOT_FOUND",
            ErrorKind::HeartbeatTimeout => "HEARTBEAT_TIMEOUT",
        };
        write!(f, "{}", s)
    }
}

/// Structured error context persisted alongside a FAILED task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub attempt: i32,
}

impl ErrorContext {
    pub fn new(kind: ErrorKind, message: impl Into<String>, attempt: i32) -> Self {
        let retryable = kind.is_retryable();
        Self {
            kind,
            message: message.into(),
            retryable,
            attempt,
        }
    }
}
