//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results for the Entry Shim
//! surface (component design §4.5).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `job.submit.v1` — `SubmitJob(jobType, parameters) -> {jobId, status}`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub job_type: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: String,
}

/// `job.status.v1` — fetch a job's current state.
#[derive(Debug, Deserialize)]
pub struct JobStatusRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub current_stage: i64,
    pub total_stages: i64,
    pub stage_results: std::collections::BTreeMap<i64, Value>,
    pub result: Option<Value>,
    pub error_details: Option<String>,
}

/// `job.cancel.v1` — fail every non-terminal task of a job and mark it
/// FAILED. No-op (returns `cancelled: false`) if the job is already
/// terminal.
#[derive(Debug, Deserialize)]
pub struct CancelJobRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// `admin.stats.v1` — aggregate job/task counts from the State Store.
#[derive(Debug, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub jobs_total: i64,
    pub jobs_processing: i64,
    pub jobs_terminal: i64,
    pub tasks_total: i64,
    pub tasks_queued: i64,
    pub tasks_processing: i64,
    pub tasks_terminal: i64,
    pub uptime_seconds: i64,
}

/// `admin.maintenance.v1` — trigger an on-demand janitor sweep outside its
/// regular interval (e.g. for an operator forcing recovery after an
/// incident).
#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResponse {
    pub swept: bool,
}
