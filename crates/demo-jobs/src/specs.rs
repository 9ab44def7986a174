use geostage_core::domain::{JobSpec, StageDef, TaskSpec};
use serde_json::Value;

/// Single-stage, single-task echo job (end-to-end scenario S1).
pub struct EchoJobSpec;

impl JobSpec for EchoJobSpec {
    fn job_type(&self) -> &str {
        "ECHO"
    }

    fn stages(&self) -> &[StageDef] {
        static STAGES: &[StageDef] = &[];
        STAGES
    }

    fn total_stages(&self) -> i64 {
        1
    }

    fn create_tasks(&self, stage: i64, job_parameters: &Value, _job_id: &str, _prior_results: &[Value]) -> Vec<TaskSpec> {
        if stage != 1 {
            return vec![];
        }
        vec![TaskSpec::new("0", "echo", job_parameters.clone())]
    }
}

/// Single-stage fan-out of five tasks squaring `0..4` (end-to-end scenario S2).
pub struct FanOutSquaresJobSpec;

impl JobSpec for FanOutSquaresJobSpec {
    fn job_type(&self) -> &str {
        "FAN_OUT_SQUARES"
    }

    fn stages(&self) -> &[StageDef] {
        static STAGES: &[StageDef] = &[];
        STAGES
    }

    fn total_stages(&self) -> i64 {
        1
    }

    fn create_tasks(&self, stage: i64, job_parameters: &Value, _job_id: &str, _prior_results: &[Value]) -> Vec<TaskSpec> {
        if stage != 1 {
            return vec![];
        }
        // Optional `invalid_task_index`: the named sibling is built with no
        // `i` parameter, so `ArithmeticSquareHandler` rejects it as invalid
        // input deterministically, with no redelivered-message race.
        let invalid_task_index = job_parameters.get("invalid_task_index").and_then(Value::as_i64);
        (0..5)
            .map(|i| {
                if Some(i) == invalid_task_index {
                    TaskSpec::new(i.to_string(), "arithmetic_square", serde_json::json!({}))
                } else {
                    TaskSpec::new(i.to_string(), "arithmetic_square", serde_json::json!({ "i": i }))
                }
            })
            .collect()
    }
}

/// Two-stage job: stage 1 squares three integers, stage 2 sums the three
/// stage-1 results (end-to-end scenario S3, cross-stage data).
pub struct TwoStageSumJobSpec;

impl JobSpec for TwoStageSumJobSpec {
    fn job_type(&self) -> &str {
        "TWO_STAGE_SUM"
    }

    fn stages(&self) -> &[StageDef] {
        static STAGES: &[StageDef] = &[];
        STAGES
    }

    fn total_stages(&self) -> i64 {
        2
    }

    fn create_tasks(&self, stage: i64, _job_parameters: &Value, _job_id: &str, prior_results: &[Value]) -> Vec<TaskSpec> {
        match stage {
            1 => (0..3)
                .map(|i| TaskSpec::new(i.to_string(), "arithmetic_square", serde_json::json!({ "i": i })))
                .collect(),
            2 => {
                let stage_one = prior_results.first().cloned().unwrap_or(Value::Null);
                let values: Vec<Value> = stage_one
                    .as_array()
                    .map(|results| {
                        results
                            .iter()
                            .map(|r| r.get("i").cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .unwrap_or_default();
                vec![TaskSpec::new("0", "sum", serde_json::json!({ "values": values }))]
            }
            _ => vec![],
        }
    }
}

/// Single-stage job around `LongRunningHandler`, with a per-taskType wall
/// clock timeout shorter than the handler's own default heartbeat
/// interval — any handler that doesn't call `beat()` on its own schedule
/// would be reclaimed well before it finishes; this spec exists to prove
/// the opposite: an honestly-beating handler survives.
pub struct LongRunningJobSpec;

impl JobSpec for LongRunningJobSpec {
    fn job_type(&self) -> &str {
        "LONG_RUNNING"
    }

    fn stages(&self) -> &[StageDef] {
        static STAGES: &[StageDef] = &[];
        STAGES
    }

    fn total_stages(&self) -> i64 {
        1
    }

    fn create_tasks(&self, stage: i64, job_parameters: &Value, _job_id: &str, _prior_results: &[Value]) -> Vec<TaskSpec> {
        if stage != 1 {
            return vec![];
        }
        vec![TaskSpec::new("0", "long_running", job_parameters.clone())]
    }
}

/// Same single long-running task as `LongRunningJobSpec`, but declares a
/// per-taskType wall-clock budget. Exercises the handler-timeout path
/// (component design §5): a handler that runs past `task_timeout_ms` is
/// aborted and classified TIMEOUT/retryable rather than left to finish.
pub struct TimeoutDemoJobSpec {
    pub task_timeout_ms: i64,
}

impl JobSpec for TimeoutDemoJobSpec {
    fn job_type(&self) -> &str {
        "TIMEOUT_DEMO"
    }

    fn stages(&self) -> &[StageDef] {
        static STAGES: &[StageDef] = &[];
        STAGES
    }

    fn total_stages(&self) -> i64 {
        1
    }

    fn create_tasks(&self, stage: i64, job_parameters: &Value, _job_id: &str, _prior_results: &[Value]) -> Vec<TaskSpec> {
        if stage != 1 {
            return vec![];
        }
        vec![TaskSpec::new("0", "long_running", job_parameters.clone())]
    }

    fn task_timeout_ms(&self, task_type: &str) -> Option<i64> {
        if task_type == "long_running" {
            Some(self.task_timeout_ms)
        } else {
            None
        }
    }

    fn max_task_retries(&self) -> i32 {
        1
    }
}
