// Handler contract: the opaque, named function a task invokes.

use crate::domain::ErrorKind;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A classified, structured handler failure. Mirrors `domain::ErrorContext`
/// minus `attempt`, which the caller fills in once the retry decision is
/// known.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }
}

/// Allows a long-running handler to renew its lease and prove liveness.
/// Implementations update both the State Store heartbeat and the message
/// bus lease (see application's worker loop for the concrete wiring).
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn beat(&self) -> crate::Result<()>;
}

/// Everything a handler invocation needs besides its own parameters.
pub struct TaskContext {
    pub job_id: String,
    pub task_id: String,
    pub stage: i64,
    pub attempt: i32,
    pub heartbeat: Arc<dyn HeartbeatSink>,
}

/// A named, registered unit of work. Handlers are expected to be
/// idempotent under at-least-once delivery; side effects keyed on
/// `task_id` are recommended.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn invoke(&self, parameters: Value, ctx: &TaskContext) -> Result<Value, HandlerError>;
}
