// Operator-initiated job cancellation. Not part of the state machine's
// own transition rules — it reuses the same cancel-siblings primitive
// the stage barrier uses for cascade failure, just scoped to the whole
// job instead of one stage.

use crate::domain::JobId;
use crate::port::StateStore;
use crate::{AppError, Result};
use std::sync::Arc;
use tracing::info;

pub struct JobControl {
    store: Arc<dyn StateStore>,
}

impl JobControl {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Cancel a non-terminal job: fail every QUEUED/PROCESSING task across
    /// all stages and mark the job FAILED. Returns `false` if the job does
    /// not exist or is already terminal (no-op, not an error).
    pub async fn cancel_job(&self, job_id: &JobId, now_millis: i64) -> Result<bool> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        if job.status.is_terminal() {
            return Ok(false);
        }

        let canceled = self.store.cancel_job_tasks(job_id, now_millis).await?;
        self.store.mark_job_failed(job_id, "canceled by operator", now_millis).await?;
        info!(job_id = %job_id, tasks_canceled = canceled, "job canceled");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobStatus, StageOnAnyFail};
    use crate::port::MockStateStore;
    use mockall::predicate::eq;

    fn queued_job(id: &str) -> Job {
        Job::new(id, "ECHO", serde_json::json!({}), 1, StageOnAnyFail::Stop, 0)
    }

    #[tokio::test]
    async fn cancel_job_fails_tasks_and_marks_job_failed() {
        let mut store = MockStateStore::new();
        store
            .expect_get_job()
            .with(eq("job-1"))
            .returning(|_| Ok(Some(queued_job("job-1"))));
        store
            .expect_cancel_job_tasks()
            .withf(|job_id, _| job_id == "job-1")
            .returning(|_, _| Ok(3));
        store
            .expect_mark_job_failed()
            .withf(|job_id, details, _| job_id == "job-1" && details == "canceled by operator")
            .returning(|_, _, _| Ok(()));

        let control = JobControl::new(Arc::new(store));
        let cancelled = control.cancel_job(&"job-1".to_string(), 1_000).await.unwrap();
        assert!(cancelled);
    }

    #[tokio::test]
    async fn cancel_job_is_a_noop_on_an_already_terminal_job() {
        let mut store = MockStateStore::new();
        store.expect_get_job().with(eq("job-1")).returning(|_| {
            let mut job = queued_job("job-1");
            job.status = JobStatus::Completed;
            Ok(Some(job))
        });
        // cancel_job_tasks/mark_job_failed must NOT be called for a terminal job.
        store.expect_cancel_job_tasks().times(0);
        store.expect_mark_job_failed().times(0);

        let control = JobControl::new(Arc::new(store));
        let cancelled = control.cancel_job(&"job-1".to_string(), 1_000).await.unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn cancel_job_errors_when_job_is_missing() {
        let mut store = MockStateStore::new();
        store.expect_get_job().with(eq("missing")).returning(|_| Ok(None));

        let control = JobControl::new(Arc::new(store));
        let result = control.cancel_job(&"missing".to_string(), 1_000).await;
        assert!(result.is_err());
    }
}
