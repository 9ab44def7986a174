// FromRow mappers between SQLite rows and domain entities.

use geostage_core::domain::{
    ErrorContext, Job, JobStatus, StageOnAnyFail, Task, TaskStatus,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::collections::BTreeMap;
use std::str::FromStr;

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "QUEUED" => JobStatus::Queued,
        "PROCESSING" => JobStatus::Processing,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" => JobStatus::Failed,
        "COMPLETED_WITH_ERRORS" => JobStatus::CompletedWithErrors,
        other => panic!("unknown job status in database: {other}"),
    }
}

pub fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "QUEUED",
        JobStatus::Processing => "PROCESSING",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Failed => "FAILED",
        JobStatus::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "QUEUED" => TaskStatus::Queued,
        "PROCESSING" => TaskStatus::Processing,
        "COMPLETED" => TaskStatus::Completed,
        "FAILED" => TaskStatus::Failed,
        other => panic!("unknown task status in database: {other}"),
    }
}

pub fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Queued => "QUEUED",
        TaskStatus::Processing => "PROCESSING",
        TaskStatus::Completed => "COMPLETED",
        TaskStatus::Failed => "FAILED",
    }
}

fn parse_stage_on_any_fail(s: &str) -> StageOnAnyFail {
    match s {
        "CONTINUE" => StageOnAnyFail::Continue,
        _ => StageOnAnyFail::Stop,
    }
}

pub fn stage_on_any_fail_str(v: StageOnAnyFail) -> &'static str {
    match v {
        StageOnAnyFail::Stop => "STOP",
        StageOnAnyFail::Continue => "CONTINUE",
    }
}

pub struct JobRow(pub Job);

impl FromRow<'_, SqliteRow> for JobRow {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let stage_results_json: String = row.try_get("stage_results")?;
        let stage_results_raw: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&stage_results_json).unwrap_or_default();
        let mut stage_results = BTreeMap::new();
        for (k, v) in stage_results_raw {
            if let Ok(stage) = i64::from_str(&k) {
                stage_results.insert(stage, v);
            }
        }

        let parameters_json: String = row.try_get("parameters")?;
        let parameters = serde_json::from_str(&parameters_json).unwrap_or(serde_json::Value::Null);

        let result_json: Option<String> = row.try_get("result")?;
        let result = result_json.and_then(|s| serde_json::from_str(&s).ok());

        let status_str: String = row.try_get("status")?;
        let stage_on_any_fail_str: String = row.try_get("stage_on_any_fail")?;

        Ok(JobRow(Job {
            id: row.try_get("id")?,
            job_type: row.try_get("job_type")?,
            status: parse_job_status(&status_str),
            parameters,
            total_stages: row.try_get("total_stages")?,
            current_stage: row.try_get("current_stage")?,
            stage_on_any_fail: parse_stage_on_any_fail(&stage_on_any_fail_str),
            stage_results,
            result,
            error_details: row.try_get("error_details")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

pub struct TaskRow(pub Task);

impl FromRow<'_, SqliteRow> for TaskRow {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let parameters_json: String = row.try_get("parameters")?;
        let parameters = serde_json::from_str(&parameters_json).unwrap_or(serde_json::Value::Null);

        let result_json: Option<String> = row.try_get("result")?;
        let result = result_json.and_then(|s| serde_json::from_str(&s).ok());

        let error_context_json: Option<String> = row.try_get("error_context")?;
        let error_context: Option<ErrorContext> = error_context_json.and_then(|s| serde_json::from_str(&s).ok());

        let status_str: String = row.try_get("status")?;

        Ok(TaskRow(Task {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            stage: row.try_get("stage")?,
            semantic_index: row.try_get("semantic_index")?,
            task_type: row.try_get("task_type")?,
            parameters,
            status: parse_task_status(&status_str),
            result,
            error_context,
            attempt_count: row.try_get("attempt_count")?,
            max_retries: row.try_get("max_retries")?,
            heartbeat: row.try_get("heartbeat")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

pub fn serialize_stage_results(map: &BTreeMap<i64, serde_json::Value>) -> String {
    let obj: serde_json::Map<String, serde_json::Value> =
        map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    serde_json::Value::Object(obj).to_string()
}
