// JobSpec contract: a "job class" collapsed to configuration plus two pure
// functions, per the no-controllers / no-inheritance redesign.

use super::stage::StageOnAnyFail;
use super::task::TaskSpec;
use serde_json::Value;

/// Default batch-publish threshold (§4.3.5).
pub const DEFAULT_BATCH_THRESHOLD: usize = 50;

/// Declarative description of a stage within a job.
#[derive(Debug, Clone)]
pub struct StageDef {
    pub number: i64,
    pub name: String,
}

/// Declarative description of a job: its stages and the pure functions that
/// build tasks and aggregate results. No base-class state; polymorphism is
/// confined to the handler function signature (Handler Registry).
pub trait JobSpec: Send + Sync {
    /// Unique key into the Job Registry.
    fn job_type(&self) -> &str;

    fn stages(&self) -> &[StageDef];

    fn total_stages(&self) -> i64 {
        self.stages().len() as i64
    }

    /// Validate submitted parameters before a job is created. Returns an
    /// error message on rejection.
    fn validate_parameters(&self, _parameters: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Pure function: derive the tasks to run for `stage`, given the job's
    /// immutable parameters and the aggregated results of every prior
    /// stage (in stage order). Determinism is required so retries and
    /// redeliveries produce identical task ids.
    fn create_tasks(
        &self,
        stage: i64,
        job_parameters: &Value,
        job_id: &str,
        prior_results: &[Value],
    ) -> Vec<TaskSpec>;

    /// Pure function: reduce per-stage aggregated results into the job's
    /// final result. Default: concatenate stage results in stage order.
    fn aggregate_results(&self, stage_results: &[Value], _job_parameters: &Value) -> Value {
        Value::Array(stage_results.to_vec())
    }

    fn batch_threshold(&self) -> usize {
        DEFAULT_BATCH_THRESHOLD
    }

    fn stage_on_any_fail(&self) -> StageOnAnyFail {
        StageOnAnyFail::Stop
    }

    fn max_task_retries(&self) -> i32 {
        3
    }

    /// Per-taskType wall-clock budget for a single handler invocation.
    /// `None` (the default) means no timeout is enforced. On expiry the
    /// invocation is aborted and classified `ErrorKind::Timeout`
    /// (retryable, see component design §5).
    fn task_timeout_ms(&self, _task_type: &str) -> Option<i64> {
        None
    }
}
