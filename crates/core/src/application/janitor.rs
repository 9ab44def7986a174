// Janitor: periodic sweeps that repair state no message delivery will
// fix on its own — stalled task heartbeats, jobs whose advance signal
// was lost, and orphaned task completions.

use crate::domain::StageOutcome;
use crate::port::{JobsMessage, MessageBus, StateStore, TaskMessage, TaskOutcome, TimeProvider};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::retry::{RetryDecision, RetryPolicy};

pub struct JanitorConfig {
    pub task_heartbeat_timeout_ms: i64,
    pub job_stall_timeout_ms: i64,
    pub sweep_batch_size: i64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            task_heartbeat_timeout_ms: 60_000,
            job_stall_timeout_ms: 600_000,
            sweep_batch_size: 100,
        }
    }
}

pub struct Janitor {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn MessageBus>,
    time: Arc<dyn TimeProvider>,
    config: JanitorConfig,
    retry: RetryPolicy,
}

impl Janitor {
    pub fn new(store: Arc<dyn StateStore>, bus: Arc<dyn MessageBus>, time: Arc<dyn TimeProvider>, config: JanitorConfig) -> Self {
        Self {
            store,
            bus,
            time,
            config,
            retry: RetryPolicy::new(),
        }
    }

    pub async fn sweep(&self) -> Result<()> {
        self.sweep_stalled_tasks().await?;
        self.sweep_stalled_jobs().await?;
        Ok(())
    }

    /// Task-stall sweep: PROCESSING tasks whose heartbeat is too old are
    /// reset to QUEUED (attempts remaining) or marked FAILED with
    /// HEARTBEAT_TIMEOUT (attempts exhausted).
    async fn sweep_stalled_tasks(&self) -> Result<()> {
        let now = self.time.now_millis();
        let cutoff = now - self.config.task_heartbeat_timeout_ms;
        let stalled = self.store.find_stalled_tasks(cutoff, self.config.sweep_batch_size).await?;

        for task in stalled {
            match self.retry.should_retry(&task) {
                RetryDecision::Retry(_) => {
                    self.store.requeue_task(&task.id, now).await?;
                    self.bus
                        .publish_task_message(TaskMessage {
                            job_id: task.job_id.clone(),
                            task_id: task.id.clone(),
                            stage: task.stage,
                            task_type: task.task_type.clone(),
                            correlation_id: format!("janitor-{}", task.id),
                        })
                        .await?;
                    warn!(task_id = %task.id, "reclaimed stalled task, republished");
                }
                RetryDecision::Exhausted => {
                    let ctx = crate::domain::ErrorContext::new(
                        crate::domain::ErrorKind::HeartbeatTimeout,
                        "task heartbeat timed out and attempts are exhausted",
                        task.attempt_count,
                    );
                    let completion = self
                        .store
                        .complete_task_and_check_stage(&task.id, TaskOutcome::Failure(ctx), now)
                        .await?;
                    let job_type = self
                        .store
                        .get_job(&task.job_id)
                        .await?
                        .map(|j| j.job_type)
                        .unwrap_or_default();
                    self.apply_completion(&task.job_id, &job_type, completion).await?;
                    warn!(task_id = %task.id, "stalled task failed permanently (heartbeat timeout)");
                }
            }
        }
        Ok(())
    }

    /// Job-progress sweep: PROCESSING jobs untouched for a long time with
    /// no non-terminal tasks remaining indicate a lost jobs-message; redrive
    /// the stage barrier by re-checking sibling task counts.
    async fn sweep_stalled_jobs(&self) -> Result<()> {
        let now = self.time.now_millis();
        let cutoff = now - self.config.job_stall_timeout_ms;
        let jobs = self.store.find_stalled_jobs(cutoff, self.config.sweep_batch_size).await?;

        for job in jobs {
            let remaining = self.store.count_nonterminal_tasks(&job.id).await?;
            if remaining > 0 {
                continue;
            }

            let tasks = self.store.find_tasks_by_stage(&job.id, job.current_stage).await?;
            if tasks.is_empty() {
                continue;
            }

            // Orphan-task sweep: every sibling of the current stage is
            // terminal but the job never advanced. Re-derive the stage
            // outcome and drive the same completion path the pivotal
            // transaction would have taken.
            let any_failed = tasks.iter().any(|t| t.status == crate::domain::TaskStatus::Failed);
            let outcome = if any_failed {
                StageOutcome::StageFailed
            } else {
                StageOutcome::StageCompleteSuccess
            };
            let aggregated = if any_failed {
                None
            } else {
                let mut ordered = tasks.clone();
                ordered.sort_by(|a, b| a.id.cmp(&b.id));
                Some(serde_json::Value::Array(
                    ordered.into_iter().map(|t| t.result.unwrap_or(serde_json::Value::Null)).collect(),
                ))
            };

            let completion = crate::port::StageCompletion {
                outcome,
                stage: job.current_stage,
                total_stages: job.total_stages,
                aggregated,
            };
            self.apply_completion(&job.id, &job.job_type, completion).await?;
            info!(job_id = %job.id, stage = job.current_stage, "repaired missed stage advance");
        }
        Ok(())
    }

    async fn apply_completion(&self, job_id: &str, job_type: &str, completion: crate::port::StageCompletion) -> Result<()> {
        match completion.outcome {
            StageOutcome::StageContinues => {}
            StageOutcome::StageFailed => {
                self.store.cancel_stage_siblings(&job_id.to_string(), completion.stage, self.time.now_millis()).await?;
                self.store
                    .mark_job_failed(&job_id.to_string(), &format!("stage {} failed", completion.stage), self.time.now_millis())
                    .await?;
            }
            StageOutcome::StageCompleteSuccess | StageOutcome::StageCompletePartial => {
                if completion.stage >= completion.total_stages {
                    let result = completion.aggregated.unwrap_or(serde_json::Value::Null);
                    if matches!(completion.outcome, StageOutcome::StageCompletePartial) {
                        self.store.mark_job_completed_with_errors(&job_id.to_string(), result, self.time.now_millis()).await?;
                    } else {
                        self.store.mark_job_completed(&job_id.to_string(), result, self.time.now_millis()).await?;
                    }
                } else {
                    self.bus
                        .publish_jobs_message(JobsMessage {
                            job_id: job_id.to_string(),
                            job_type: job_type.to_string(),
                            stage: completion.stage + 1,
                            correlation_id: format!("janitor-{job_id}"),
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }
}
