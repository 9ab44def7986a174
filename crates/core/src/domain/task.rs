// Task domain entity

use super::error::ErrorContext;
use serde::{Deserialize, Serialize};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// The finest unit of work observed by the orchestrator, executed by a
/// single named handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: String,
    pub stage: i64,
    /// Stable position of this task within its stage's fan-out; used only
    /// to derive `id` deterministically and to order aggregated results.
    pub semantic_index: String,
    pub task_type: String,
    pub parameters: serde_json::Value,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error_context: Option<ErrorContext>,
    pub attempt_count: i32,
    pub max_retries: i32,
    pub heartbeat: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        job_id: impl Into<String>,
        stage: i64,
        semantic_index: impl Into<String>,
        task_type: impl Into<String>,
        parameters: serde_json::Value,
        max_retries: i32,
        now_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            job_id: job_id.into(),
            stage,
            semantic_index: semantic_index.into(),
            task_type: task_type.into(),
            parameters,
            status: TaskStatus::Queued,
            result: None,
            error_context: None,
            attempt_count: 0,
            max_retries,
            heartbeat: None,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }
}

/// A spec for a task to be created, as returned by `JobSpec::create_tasks`.
/// `semantic_index` must be stable across retries of the same stage so the
/// derived `taskId` is reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub semantic_index: String,
    pub task_type: String,
    pub parameters: serde_json::Value,
}

impl TaskSpec {
    pub fn new(
        semantic_index: impl Into<String>,
        task_type: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            semantic_index: semantic_index.into(),
            task_type: task_type.into(),
            parameters,
        }
    }
}
