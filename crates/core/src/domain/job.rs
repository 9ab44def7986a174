// Job domain entity

use super::error::{DomainError, Result};
use super::stage::StageOnAnyFail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    CompletedWithErrors,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::CompletedWithErrors
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
        };
        write!(f, "{}", s)
    }
}

/// A user-submitted unit of work composed of an ordered sequence of stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    pub parameters: serde_json::Value,
    pub total_stages: i64,
    pub current_stage: i64,
    /// Denormalized from the JobSpec at creation time so the pivotal
    /// stage-completion transaction can classify outcomes without a
    /// callback into the Job Registry.
    pub stage_on_any_fail: StageOnAnyFail,
    /// stage number -> aggregated per-task results for that stage
    pub stage_results: BTreeMap<i64, serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error_details: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        job_type: impl Into<String>,
        parameters: serde_json::Value,
        total_stages: i64,
        stage_on_any_fail: StageOnAnyFail,
        now_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            job_type: job_type.into(),
            status: JobStatus::Queued,
            parameters,
            total_stages,
            current_stage: 1,
            stage_on_any_fail,
            stage_results: BTreeMap::new(),
            result: None,
            error_details: None,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }

    /// Results of every stage strictly before `stage`, in stage order.
    pub fn prior_results(&self, stage: i64) -> Vec<serde_json::Value> {
        (1..stage)
            .map(|s| {
                self.stage_results
                    .get(&s)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null)
            })
            .collect()
    }

    pub fn mark_processing(&mut self, stage: i64, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: JobStatus::Processing.to_string(),
            });
        }
        self.status = JobStatus::Processing;
        self.current_stage = stage;
        self.updated_at = now_millis;
        Ok(())
    }

    pub fn mark_completed(&mut self, result: serde_json::Value, now_millis: i64) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.updated_at = now_millis;
    }

    pub fn mark_completed_with_errors(&mut self, result: serde_json::Value, now_millis: i64) {
        self.status = JobStatus::CompletedWithErrors;
        self.result = Some(result);
        self.updated_at = now_millis;
    }

    pub fn mark_failed(&mut self, error_details: impl Into<String>, now_millis: i64) {
        self.status = JobStatus::Failed;
        self.error_details = Some(error_details.into());
        self.updated_at = now_millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_results_empty_for_stage_one() {
        let job = Job::new("job-1", "TEST", serde_json::json!({}), 2, StageOnAnyFail::Stop, 0);
        assert!(job.prior_results(1).is_empty());
    }

    #[test]
    fn prior_results_pulls_earlier_stages_in_order() {
        let mut job = Job::new("job-1", "TEST", serde_json::json!({}), 3, StageOnAnyFail::Stop, 0);
        job.stage_results.insert(1, serde_json::json!([1, 2]));
        job.stage_results.insert(2, serde_json::json!([3]));
        let prior = job.prior_results(3);
        assert_eq!(prior, vec![serde_json::json!([1, 2]), serde_json::json!([3])]);
    }

    #[test]
    fn terminal_job_rejects_mark_processing() {
        let mut job = Job::new("job-1", "TEST", serde_json::json!({}), 1, StageOnAnyFail::Stop, 0);
        job.mark_completed(serde_json::json!([]), 1);
        assert!(job.mark_processing(1, 2).is_err());
    }
}
