// State Store port: the durable, transactional home for jobs and tasks.
//
// `complete_task_and_check_stage` is the pivotal operation (see
// application::core_machine); every other method exists to support it or
// the surrounding job/task lifecycle.

use crate::domain::{ErrorContext, Job, JobId, Task, TaskId, TaskSpec};
use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

/// Outcome of `create_job`'s idempotent insert-by-primary-key.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The row was newly inserted by this call.
    Created(Job),
    /// A row with this id already existed; `job` is that existing row.
    Existing(Job),
}

impl CreateOutcome {
    pub fn into_job(self) -> Job {
        match self {
            CreateOutcome::Created(job) | CreateOutcome::Existing(job) => job,
        }
    }
}

/// Outcome of attempting to activate a stage under the job row lock.
#[derive(Debug, Clone)]
pub enum ActivateOutcome {
    /// `current_stage` had already moved past the message's stage, or the
    /// job was terminal; nothing was done.
    Stale,
    /// The stage was (re-)activated; `new_task_ids` lists tasks that were
    /// newly inserted by this call (absent before, so callers know which
    /// TaskMessages to publish — duplicates from redelivery are excluded).
    Activated { new_task_ids: Vec<TaskId> },
}

/// What `complete_task_and_check_stage` was told happened to the task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success(Value),
    Failure(ErrorContext),
}

/// Result of `complete_task_and_check_stage`, computed under the job lock.
#[derive(Debug, Clone)]
pub struct StageCompletion {
    pub outcome: crate::domain::StageOutcome,
    pub stage: i64,
    pub total_stages: i64,
    /// Present only when the stage just completed (success or partial).
    pub aggregated: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub jobs_total: i64,
    pub jobs_processing: i64,
    pub jobs_terminal: i64,
    pub tasks_total: i64,
    pub tasks_queued: i64,
    pub tasks_processing: i64,
    pub tasks_terminal: i64,
}

/// Durable state for jobs, tasks, and the stage barrier between them.
///
/// Implementations MUST make `complete_task_and_check_stage` and
/// `activate_stage` serializable with respect to each other and to
/// themselves for a given job id: only one caller may observe itself as
/// the task that completes a stage.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert `job`; if a row with the same id already exists, return it
    /// unchanged (idempotent create by primary key). The returned
    /// `CreateOutcome` tells the caller, without a racy timestamp
    /// comparison, whether this call is the one that actually inserted the
    /// row (and so is the one responsible for publishing stage 1).
    async fn create_job(&self, job: Job) -> crate::Result<CreateOutcome>;

    async fn get_job(&self, job_id: &str) -> crate::Result<Option<Job>>;

    async fn get_task(&self, task_id: &str) -> crate::Result<Option<Task>>;

    /// Re-validate `stage` against the job's `current_stage` under a row
    /// lock, materialize `task_specs` as QUEUED tasks (idempotent by task
    /// id), and flip the job to PROCESSING at `stage`.
    async fn activate_stage(
        &self,
        job_id: &JobId,
        stage: i64,
        task_specs: &[(TaskId, TaskSpec)],
        max_retries: i32,
    ) -> crate::Result<ActivateOutcome>;

    /// Atomic QUEUED -> PROCESSING transition; sets heartbeat, increments
    /// `attempt_count`. Returns `None` if the task is not currently QUEUED.
    async fn claim_task_for_processing(&self, task_id: &TaskId, now_millis: i64) -> crate::Result<Option<Task>>;

    /// Update `heartbeat` only if the task is still PROCESSING.
    async fn heartbeat(&self, task_id: &TaskId, now_millis: i64) -> crate::Result<bool>;

    /// Reset a task from PROCESSING back to QUEUED (transient retry path;
    /// does not increment `attempt_count` — that happens on the next
    /// claim). No-op if the task is not currently PROCESSING.
    async fn requeue_task(&self, task_id: &TaskId, now_millis: i64) -> crate::Result<bool>;

    /// The pivotal atomic operation (see component design §4.3.3): writes
    /// the task's terminal status/result, counts terminal siblings for
    /// `(job_id, stage)`, classifies the stage outcome, and — if the
    /// stage just completed — aggregates per-task results into
    /// `Job.stage_results[stage]`. Idempotent: a task already terminal
    /// short-circuits to `StageOutcome::StageContinues` without touching
    /// aggregation.
    async fn complete_task_and_check_stage(
        &self,
        task_id: &TaskId,
        outcome: TaskOutcome,
        now_millis: i64,
    ) -> crate::Result<StageCompletion>;

    /// Mark every QUEUED or PROCESSING task of `(job_id, stage)` as FAILED
    /// with error kind CANCELED.
    async fn cancel_stage_siblings(&self, job_id: &JobId, stage: i64, now_millis: i64) -> crate::Result<u64>;

    /// Mark every QUEUED or PROCESSING task of `job_id`, across all stages,
    /// as FAILED with error kind CANCELED. Used for operator-initiated
    /// cancellation, not the stage barrier's cascade-fail path.
    async fn cancel_job_tasks(&self, job_id: &JobId, now_millis: i64) -> crate::Result<u64>;

    async fn mark_job_completed(&self, job_id: &JobId, result: Value, now_millis: i64) -> crate::Result<()>;

    async fn mark_job_completed_with_errors(&self, job_id: &JobId, result: Value, now_millis: i64) -> crate::Result<()>;

    async fn mark_job_failed(&self, job_id: &JobId, error_details: &str, now_millis: i64) -> crate::Result<()>;

    /// Tasks PROCESSING with a heartbeat older than `older_than_millis`.
    async fn find_stalled_tasks(&self, older_than_millis: i64, limit: i64) -> crate::Result<Vec<Task>>;

    /// Jobs PROCESSING, untouched since `older_than_millis`, with zero
    /// non-terminal tasks remaining (a missed advance signal).
    async fn find_stalled_jobs(&self, older_than_millis: i64, limit: i64) -> crate::Result<Vec<Job>>;

    async fn count_nonterminal_tasks(&self, job_id: &JobId) -> crate::Result<i64>;

    async fn find_tasks_by_stage(&self, job_id: &JobId, stage: i64) -> crate::Result<Vec<Task>>;

    async fn stats(&self) -> crate::Result<StoreStats>;
}
