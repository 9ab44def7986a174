// SQLite implementation of the State Store port.
//
// `complete_task_and_check_stage` and `activate_stage` are realized as a
// single sqlx transaction using `BEGIN IMMEDIATE`, which takes SQLite's
// whole-database write lock up front — the closest equivalent to row-level
// `SELECT ... FOR UPDATE` that SQLite (single-writer) offers.

use crate::error_mapping::map_sqlx_error;
use crate::rows::{job_status_str, serialize_stage_results, stage_on_any_fail_str, task_status_str, JobRow, TaskRow};
use async_trait::async_trait;
use geostage_core::domain::{
    ErrorContext, Job, JobId, StageOutcome, Task, TaskId, TaskSpec, TaskStatus,
};
use geostage_core::error::AppError;
use geostage_core::port::{ActivateOutcome, CreateOutcome, StageCompletion, StateStore, StoreStats, TaskOutcome};
use geostage_core::Result;
use sqlx::{Executor, SqlitePool};
use tracing::debug;

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn create_job(&self, job: Job) -> Result<CreateOutcome> {
        let parameters_json = serde_json::to_string(&job.parameters).map_err(AppError::Serialization)?;
        let stage_results_json = serialize_stage_results(&job.stage_results);

        let result = sqlx::query(
            "INSERT OR IGNORE INTO jobs
             (id, job_type, status, parameters, total_stages, current_stage, stage_on_any_fail, stage_results, result, error_details, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.job_type)
        .bind(job_status_str(job.status))
        .bind(&parameters_json)
        .bind(job.total_stages)
        .bind(job.current_stage)
        .bind(stage_on_any_fail_str(job.stage_on_any_fail))
        .bind(&stage_results_json)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let stored = self
            .get_job(&job.id)
            .await?
            .ok_or_else(|| AppError::Internal("job vanished immediately after create".to_string()))?;

        if result.rows_affected() == 1 {
            Ok(CreateOutcome::Created(stored))
        } else {
            Ok(CreateOutcome::Existing(stored))
        }
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|r| r.0))
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|r| r.0))
    }

    async fn activate_stage(
        &self,
        job_id: &JobId,
        stage: i64,
        task_specs: &[(TaskId, TaskSpec)],
        max_retries: i32,
    ) -> Result<ActivateOutcome> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        tx.execute("BEGIN IMMEDIATE").await.ok();

        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let job = match row {
            Some(r) => r.0,
            None => {
                tx.rollback().await.ok();
                return Err(AppError::NotFound(format!("job {job_id} not found")));
            }
        };

        if job.status.is_terminal() || (stage != job.current_stage && stage != job.current_stage + 1) {
            tx.rollback().await.ok();
            return Ok(ActivateOutcome::Stale);
        }

        let mut new_task_ids = Vec::new();
        for (task_id, spec) in task_specs {
            let parameters_json = serde_json::to_string(&spec.parameters).map_err(AppError::Serialization)?;
            let now = job.updated_at;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO tasks
                 (id, job_id, stage, semantic_index, task_type, parameters, status, result, error_context, attempt_count, max_retries, heartbeat, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, 'QUEUED', NULL, NULL, 0, ?, NULL, ?, ?)",
            )
            .bind(task_id)
            .bind(job_id)
            .bind(stage)
            .bind(&spec.semantic_index)
            .bind(&spec.task_type)
            .bind(&parameters_json)
            .bind(max_retries)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 1 {
                new_task_ids.push(task_id.clone());
            }
        }

        sqlx::query("UPDATE jobs SET status = 'PROCESSING', current_stage = ?, updated_at = ? WHERE id = ?")
            .bind(stage)
            .bind(job.updated_at)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ActivateOutcome::Activated { new_task_ids })
    }

    async fn claim_task_for_processing(&self, task_id: &TaskId, now_millis: i64) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "UPDATE tasks SET status = 'PROCESSING', heartbeat = ?, attempt_count = attempt_count + 1, updated_at = ?
             WHERE id = ? AND status = 'QUEUED'
             RETURNING *",
        )
        .bind(now_millis)
        .bind(now_millis)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(|r| r.0))
    }

    async fn heartbeat(&self, task_id: &TaskId, now_millis: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET heartbeat = ? WHERE id = ? AND status = 'PROCESSING'")
            .bind(now_millis)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn requeue_task(&self, task_id: &TaskId, now_millis: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'QUEUED', heartbeat = NULL, updated_at = ? WHERE id = ? AND status = 'PROCESSING'",
        )
        .bind(now_millis)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_task_and_check_stage(
        &self,
        task_id: &TaskId,
        outcome: TaskOutcome,
        now_millis: i64,
    ) -> Result<StageCompletion> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        tx.execute("BEGIN IMMEDIATE").await.ok();

        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let task = match row {
            Some(r) => r.0,
            None => {
                tx.rollback().await.ok();
                return Err(AppError::NotFound(format!("task {task_id} not found")));
            }
        };

        let job_row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(&task.job_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let job = job_row
            .map(|r| r.0)
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", task.job_id)))?;

        if task.status.is_terminal() {
            tx.rollback().await.ok();
            debug!(task_id = %task.id, "task already terminal, completion is a no-op");
            return Ok(StageCompletion {
                outcome: StageOutcome::StageContinues,
                stage: task.stage,
                total_stages: job.total_stages,
                aggregated: None,
            });
        }

        let (new_status, result_json, error_context_json) = match &outcome {
            TaskOutcome::Success(value) => (
                TaskStatus::Completed,
                Some(serde_json::to_string(value).map_err(AppError::Serialization)?),
                None,
            ),
            TaskOutcome::Failure(ctx) => (
                TaskStatus::Failed,
                None,
                Some(serde_json::to_string(ctx).map_err(AppError::Serialization)?),
            ),
        };

        sqlx::query(
            "UPDATE tasks SET status = ?, result = ?, error_context = ?, updated_at = ? WHERE id = ?",
        )
        .bind(task_status_str(new_status))
        .bind(&result_json)
        .bind(&error_context_json)
        .bind(now_millis)
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE job_id = ? AND stage = ?")
            .bind(&task.job_id)
            .bind(task.stage)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let completed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE job_id = ? AND stage = ? AND status = 'COMPLETED'",
        )
        .bind(&task.job_id)
        .bind(task.stage)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let failed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE job_id = ? AND stage = ? AND status = 'FAILED'",
        )
        .bind(&task.job_id)
        .bind(task.stage)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let stage_outcome = if failed > 0 && job.stage_on_any_fail == geostage_core::domain::StageOnAnyFail::Stop {
            StageOutcome::StageFailed
        } else if completed + failed == total {
            if failed == 0 {
                StageOutcome::StageCompleteSuccess
            } else {
                StageOutcome::StageCompletePartial
            }
        } else {
            StageOutcome::StageContinues
        };

        let aggregated = match stage_outcome {
            StageOutcome::StageCompleteSuccess | StageOutcome::StageCompletePartial => {
                let sibling_rows: Vec<TaskRow> = sqlx::query_as(
                    "SELECT * FROM tasks WHERE job_id = ? AND stage = ? ORDER BY id ASC",
                )
                .bind(&task.job_id)
                .bind(task.stage)
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
                let values: Vec<serde_json::Value> = sibling_rows
                    .into_iter()
                    .map(|r| r.0.result.unwrap_or(serde_json::Value::Null))
                    .collect();
                let aggregated = serde_json::Value::Array(values);

                sqlx::query(
                    "UPDATE jobs SET stage_results = json_set(stage_results, '$.' || ?, json(?)) WHERE id = ?",
                )
                .bind(task.stage.to_string())
                .bind(aggregated.to_string())
                .bind(&task.job_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

                Some(aggregated)
            }
            _ => None,
        };

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(StageCompletion {
            outcome: stage_outcome,
            stage: task.stage,
            total_stages: job.total_stages,
            aggregated,
        })
    }

    async fn cancel_stage_siblings(&self, job_id: &JobId, stage: i64, now_millis: i64) -> Result<u64> {
        let ctx = ErrorContext::new(geostage_core::domain::ErrorKind::Canceled, "stage cascade-failed", 0);
        let ctx_json = serde_json::to_string(&ctx).map_err(AppError::Serialization)?;

        let result = sqlx::query(
            "UPDATE tasks SET status = 'FAILED', error_context = ?, updated_at = ?
             WHERE job_id = ? AND stage = ? AND status IN ('QUEUED', 'PROCESSING')",
        )
        .bind(&ctx_json)
        .bind(now_millis)
        .bind(job_id)
        .bind(stage)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn cancel_job_tasks(&self, job_id: &JobId, now_millis: i64) -> Result<u64> {
        let ctx = ErrorContext::new(geostage_core::domain::ErrorKind::Canceled, "canceled by operator", 0);
        let ctx_json = serde_json::to_string(&ctx).map_err(AppError::Serialization)?;

        let result = sqlx::query(
            "UPDATE tasks SET status = 'FAILED', error_context = ?, updated_at = ?
             WHERE job_id = ? AND status IN ('QUEUED', 'PROCESSING')",
        )
        .bind(&ctx_json)
        .bind(now_millis)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn mark_job_completed(&self, job_id: &JobId, result: serde_json::Value, now_millis: i64) -> Result<()> {
        let result_json = serde_json::to_string(&result).map_err(AppError::Serialization)?;
        sqlx::query("UPDATE jobs SET status = 'COMPLETED', result = ?, updated_at = ? WHERE id = ?")
            .bind(&result_json)
            .bind(now_millis)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_job_completed_with_errors(&self, job_id: &JobId, result: serde_json::Value, now_millis: i64) -> Result<()> {
        let result_json = serde_json::to_string(&result).map_err(AppError::Serialization)?;
        sqlx::query("UPDATE jobs SET status = 'COMPLETED_WITH_ERRORS', result = ?, updated_at = ? WHERE id = ?")
            .bind(&result_json)
            .bind(now_millis)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_job_failed(&self, job_id: &JobId, error_details: &str, now_millis: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'FAILED', error_details = ?, updated_at = ? WHERE id = ?")
            .bind(error_details)
            .bind(now_millis)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_stalled_tasks(&self, older_than_millis: i64, limit: i64) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = 'PROCESSING' AND heartbeat < ? ORDER BY heartbeat ASC LIMIT ?",
        )
        .bind(older_than_millis)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn find_stalled_jobs(&self, older_than_millis: i64, limit: i64) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE status = 'PROCESSING' AND updated_at < ? ORDER BY updated_at ASC LIMIT ?",
        )
        .bind(older_than_millis)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn count_nonterminal_tasks(&self, job_id: &JobId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE job_id = ? AND status IN ('QUEUED', 'PROCESSING')",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count)
    }

    async fn find_tasks_by_stage(&self, job_id: &JobId, stage: i64) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE job_id = ? AND stage = ? ORDER BY id ASC")
            .bind(job_id)
            .bind(stage)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let jobs_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let jobs_processing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'PROCESSING'")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let jobs_terminal: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('COMPLETED', 'FAILED', 'COMPLETED_WITH_ERRORS')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        let tasks_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let tasks_queued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = 'QUEUED'")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let tasks_processing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = 'PROCESSING'")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let tasks_terminal: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status IN ('COMPLETED', 'FAILED')")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(StoreStats {
            jobs_total,
            jobs_processing,
            jobs_terminal,
            tasks_total,
            tasks_queued,
            tasks_processing,
            tasks_terminal,
        })
    }
}
