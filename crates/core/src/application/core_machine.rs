// CoreMachine: the orchestrator. Consumes JobsMessage/TaskMessage and
// drives the job/stage/task state machine. Never holds the job row lock
// across handler execution — only `StateStore::complete_task_and_check_stage`
// and `activate_stage` take that lock, and both live in the infra adapter.

use crate::domain::ids;
use crate::domain::{ErrorContext, ErrorKind, StageOutcome, Task, TaskSpec};
use crate::port::{
    ActivateOutcome, HandlerError, JobsMessage, MessageBus, StageCompletion, StateStore, TaskContext, TaskHandler,
    TaskMessage, TaskOutcome, TimeProvider,
};
use crate::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::registry::{HandlerRegistry, JobRegistry};
use super::retry::{RetryDecision, RetryPolicy};

#[cfg(test)]
#[path = "core_machine_test.rs"]
mod core_machine_test;

pub struct CoreMachine {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn MessageBus>,
    jobs: Arc<JobRegistry>,
    handlers: Arc<HandlerRegistry>,
    time: Arc<dyn TimeProvider>,
    retry: RetryPolicy,
}

impl CoreMachine {
    pub fn new(
        store: Arc<dyn StateStore>,
        bus: Arc<dyn MessageBus>,
        jobs: Arc<JobRegistry>,
        handlers: Arc<HandlerRegistry>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            bus,
            jobs,
            handlers,
            time,
            retry: RetryPolicy::new(),
        }
    }

    /// Stage activation (component design §4.3.1).
    pub async fn handle_jobs_message(&self, msg: JobsMessage, correlation_id: &str) -> Result<()> {
        let job = match self.store.get_job(&msg.job_id).await? {
            Some(job) => job,
            None => {
                warn!(job_id = %msg.job_id, correlation_id, "jobs message for unknown job, dropping");
                return Ok(());
            }
        };

        if job.status.is_terminal() {
            info!(job_id = %job.id, "job already terminal, ignoring stage message");
            return Ok(());
        }

        // Tolerate equal (redelivery/idempotent re-activation) or the next
        // stage; anything else is stale.
        if msg.stage != job.current_stage && msg.stage != job.current_stage + 1 {
            info!(job_id = %job.id, msg_stage = msg.stage, current_stage = job.current_stage, "stale jobs message, ignoring");
            return Ok(());
        }

        let spec = self
            .jobs
            .get(&job.job_type)
            .ok_or_else(|| AppError::NotFound(format!("unknown job type: {}", job.job_type)))?;

        let prior_results = job.prior_results(msg.stage);
        let task_specs: Vec<TaskSpec> = spec.create_tasks(msg.stage, &job.parameters, &job.id, &prior_results);

        let keyed_specs: Vec<(String, TaskSpec)> = task_specs
            .into_iter()
            .map(|spec| {
                let task_id = ids::task_id(&job.id, msg.stage, &spec.semantic_index);
                (task_id, spec)
            })
            .collect();

        let outcome = self
            .store
            .activate_stage(&job.id, msg.stage, &keyed_specs, spec.max_task_retries())
            .await?;

        let new_task_ids = match outcome {
            ActivateOutcome::Stale => {
                info!(job_id = %job.id, stage = msg.stage, "stage activation stale, skipping fanout");
                return Ok(());
            }
            ActivateOutcome::Activated { new_task_ids } => new_task_ids,
        };

        if new_task_ids.is_empty() {
            info!(job_id = %job.id, stage = msg.stage, "stage produced no tasks, advancing immediately");
            return Ok(());
        }

        let by_id: std::collections::HashMap<_, _> = keyed_specs.into_iter().collect();
        let batch_threshold = spec.batch_threshold();
        let messages: Vec<TaskMessage> = new_task_ids
            .iter()
            .filter_map(|task_id| {
                by_id.get(task_id).map(|task_spec| TaskMessage {
                    job_id: job.id.clone(),
                    task_id: task_id.clone(),
                    stage: msg.stage,
                    task_type: task_spec.task_type.clone(),
                    correlation_id: correlation_id.to_string(),
                })
            })
            .collect();

        if messages.len() > batch_threshold {
            self.bus.publish_task_messages(messages).await?;
        } else {
            for message in messages {
                self.bus.publish_task_message(message).await?;
            }
        }

        info!(job_id = %job.id, stage = msg.stage, task_count = new_task_ids.len(), "stage activated");
        Ok(())
    }

    /// Task execution (component design §4.3.2). `delivery_id`/`lease_millis`
    /// identify the bus delivery that carried `msg`, so a long-running
    /// handler's heartbeat can renew its visibility lease, not just the
    /// State Store's.
    pub async fn handle_task_message(&self, msg: TaskMessage, delivery_id: i64, lease_millis: i64) -> Result<()> {
        let now = self.time.now_millis();
        let task = match self.store.claim_task_for_processing(&msg.task_id, now).await? {
            Some(task) => task,
            None => {
                info!(task_id = %msg.task_id, "task not claimable (terminal or already taken), dropping message");
                return Ok(());
            }
        };

        info!(job_id = %task.job_id, task_id = %task.id, stage = task.stage, task_type = %task.task_type, "task claimed");

        let outcome = match self.handlers.get(&task.task_type) {
            None => TaskOutcome::Failure(ErrorContext::new(
                ErrorKind::HandlerNotFound,
                format!("no handler registered for task type {}", task.task_type),
                task.attempt_count,
            )),
            Some(handler) => {
                let timeout_ms = self.task_timeout_ms(&task).await?;
                self.invoke_and_classify(handler, &task, &msg, delivery_id, lease_millis, timeout_ms)
                    .await
            }
        };

        let outcome = match outcome {
            TaskOutcome::Failure(ctx) if ctx.kind.is_retryable() => {
                match self.retry.should_retry(&task) {
                    RetryDecision::Retry(delay_ms) => {
                        self.store.requeue_task(&task.id, self.time.now_millis()).await?;
                        let visible_at = self.time.now_millis() + delay_ms;
                        self.bus.publish_task_message_after(msg.clone(), visible_at).await?;
                        info!(task_id = %task.id, delay_ms, "task scheduled for retry");
                        return Ok(());
                    }
                    RetryDecision::Exhausted => TaskOutcome::Failure(ctx),
                }
            }
            other => other,
        };

        let completion = self
            .store
            .complete_task_and_check_stage(&task.id, outcome, self.time.now_millis())
            .await?;

        self.act_on_stage_completion(&task.job_id, completion, &msg.correlation_id)
            .await
    }

    /// Per-taskType wall-clock budget declared by the task's owning job's
    /// `JobSpec`, resolved via the job row (tasks don't carry `job_type`
    /// directly). `None` if the job has vanished, the job type is unknown,
    /// or the spec declares no timeout for this task type.
    async fn task_timeout_ms(&self, task: &Task) -> Result<Option<i64>> {
        let job = self.store.get_job(&task.job_id).await?;
        Ok(job
            .and_then(|job| self.jobs.get(&job.job_type))
            .and_then(|spec| spec.task_timeout_ms(&task.task_type)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke_and_classify(
        &self,
        handler: Arc<dyn TaskHandler>,
        task: &Task,
        msg: &TaskMessage,
        delivery_id: i64,
        lease_millis: i64,
        timeout_ms: Option<i64>,
    ) -> TaskOutcome {
        let heartbeat = Arc::new(super::worker::StoreHeartbeatSink {
            store: self.store.clone(),
            bus: self.bus.clone(),
            task_id: task.id.clone(),
            delivery_id,
            lease_millis,
            time: self.time.clone(),
        });
        let ctx = TaskContext {
            job_id: task.job_id.clone(),
            task_id: task.id.clone(),
            stage: task.stage,
            attempt: task.attempt_count,
            heartbeat,
        };

        let invocation = std::panic::AssertUnwindSafe(handler.invoke(task.parameters.clone(), &ctx));
        let guarded = futures::FutureExt::catch_unwind(invocation);

        // `tokio::time::timeout` drops the guarded future at its next
        // await point on expiry — the handler is aborted cooperatively,
        // not forcibly.
        let outcome = match timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms.max(0) as u64), guarded)
                .await
                .map_err(|_| ms),
            None => Ok(guarded.await),
        };

        match outcome {
            Ok(Ok(Ok(result))) => TaskOutcome::Success(result),
            Ok(Ok(Err(HandlerError { kind, message }))) => TaskOutcome::Failure(ErrorContext::new(kind, message, task.attempt_count)),
            Ok(Err(_)) => {
                warn!(task_id = %msg.task_id, "handler panicked, classifying as permanent failure");
                TaskOutcome::Failure(ErrorContext::new(ErrorKind::Permanent, "handler panicked", task.attempt_count))
            }
            Err(ms) => {
                warn!(task_id = %msg.task_id, timeout_ms = ms, "handler exceeded wall-clock timeout, classifying as TIMEOUT");
                TaskOutcome::Failure(ErrorContext::new(
                    ErrorKind::Timeout,
                    format!("handler exceeded {ms}ms wall-clock timeout"),
                    task.attempt_count,
                ))
            }
        }
    }

    async fn act_on_stage_completion(&self, job_id: &str, completion: StageCompletion, correlation_id: &str) -> Result<()> {
        match completion.outcome {
            StageOutcome::StageContinues => Ok(()),
            StageOutcome::StageFailed => {
                self.store
                    .cancel_stage_siblings(&job_id.to_string(), completion.stage, self.time.now_millis())
                    .await?;
                self.store
                    .mark_job_failed(
                        &job_id.to_string(),
                        &format!("stage {} failed", completion.stage),
                        self.time.now_millis(),
                    )
                    .await?;
                info!(job_id, stage = completion.stage, "stage failed, job marked failed");
                Ok(())
            }
            StageOutcome::StageCompleteSuccess | StageOutcome::StageCompletePartial => {
                let job = self
                    .store
                    .get_job(job_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("job {job_id} vanished mid-completion")))?;
                let spec = self
                    .jobs
                    .get(&job.job_type)
                    .ok_or_else(|| AppError::NotFound(format!("unknown job type: {}", job.job_type)))?;

                let is_final = completion.stage >= completion.total_stages;
                let partial = matches!(completion.outcome, StageOutcome::StageCompletePartial);

                if is_final {
                    let mut stage_results: Vec<serde_json::Value> = (1..=completion.total_stages)
                        .map(|s| {
                            if s == completion.stage {
                                completion.aggregated.clone().unwrap_or(serde_json::Value::Null)
                            } else {
                                job.stage_results.get(&s).cloned().unwrap_or(serde_json::Value::Null)
                            }
                        })
                        .collect();
                    stage_results.truncate(completion.total_stages as usize);
                    let final_result = spec.aggregate_results(&stage_results, &job.parameters);

                    if partial {
                        self.store
                            .mark_job_completed_with_errors(&job.id, final_result, self.time.now_millis())
                            .await?;
                    } else {
                        self.store.mark_job_completed(&job.id, final_result, self.time.now_millis()).await?;
                    }
                    info!(job_id = %job.id, "job completed");
                } else if partial && spec.stage_on_any_fail() == crate::domain::StageOnAnyFail::Stop {
                    self.store
                        .mark_job_failed(
                            &job.id,
                            &format!("stage {} completed with errors", completion.stage),
                            self.time.now_millis(),
                        )
                        .await?;
                    info!(job_id = %job.id, stage = completion.stage, "partial stage, stopping job per policy");
                } else {
                    self.bus
                        .publish_jobs_message(JobsMessage {
                            job_id: job.id.clone(),
                            job_type: job.job_type.clone(),
                            stage: completion.stage + 1,
                            correlation_id: correlation_id.to_string(),
                        })
                        .await?;
                    info!(job_id = %job.id, next_stage = completion.stage + 1, "stage advanced");
                }
                Ok(())
            }
        }
    }
}
