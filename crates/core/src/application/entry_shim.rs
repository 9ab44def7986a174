// Entry Shim: the only supported way into the orchestrator. Validates,
// computes a deterministic job id, persists the Job row, and enqueues
// stage 1 — never executes work inline.

use crate::domain::ids;
use crate::domain::{Job, JobId, JobStatus};
use crate::port::{CreateOutcome, IdProvider, JobsMessage, MessageBus, StateStore, TimeProvider};
use crate::{AppError, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::registry::JobRegistry;

pub struct SubmitOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
}

pub struct EntryShim {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn MessageBus>,
    registry: Arc<JobRegistry>,
    time: Arc<dyn TimeProvider>,
    ids: Arc<dyn IdProvider>,
}

impl EntryShim {
    pub fn new(
        store: Arc<dyn StateStore>,
        bus: Arc<dyn MessageBus>,
        registry: Arc<JobRegistry>,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            time,
            ids,
        }
    }

    /// `SubmitJob(jobType, parameters) -> {jobId, status}`. Idempotent:
    /// repeated calls with equal canonicalized parameters return the same
    /// job unchanged, with no further side effects.
    pub async fn submit_job(&self, job_type: &str, parameters: Value) -> Result<SubmitOutcome> {
        let spec = self
            .registry
            .get(job_type)
            .ok_or_else(|| AppError::NotFound(format!("unknown job type: {job_type}")))?;

        spec.validate_parameters(&parameters)
            .map_err(AppError::Validation)?;

        let job_id = ids::job_id(job_type, &parameters);
        let now = self.time.now_millis();
        let job = Job::new(
            job_id.clone(),
            job_type,
            parameters,
            spec.total_stages(),
            spec.stage_on_any_fail(),
            now,
        );

        let outcome = self.store.create_job(job).await?;

        let stored = match outcome {
            CreateOutcome::Created(stored) => {
                self.bus
                    .publish_jobs_message(JobsMessage {
                        job_id: stored.id.clone(),
                        job_type: stored.job_type.clone(),
                        stage: 1,
                        correlation_id: self.ids.generate_id(),
                    })
                    .await?;
                info!(job_id = %stored.id, job_type, "job submitted");
                stored
            }
            CreateOutcome::Existing(stored) => {
                info!(job_id = %stored.id, job_type, "job submission deduplicated");
                stored
            }
        };

        Ok(SubmitOutcome {
            job_id: stored.id,
            status: stored.status,
        })
    }
}
