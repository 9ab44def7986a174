//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from the api-rpc crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Request to submit a new job.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobRequest {
    pub job_type: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Response from `job.submit.v1`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: String,
}

/// Request to fetch a job's current state.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusRequest {
    pub job_id: String,
}

/// Response from `job.status.v1`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub current_stage: i64,
    pub total_stages: i64,
    pub stage_results: BTreeMap<i64, Value>,
    pub result: Option<Value>,
    pub error_details: Option<String>,
}

/// Request to cancel a job.
#[derive(Debug, Clone, Serialize)]
pub struct CancelJobRequest {
    pub job_id: String,
}

/// Response from `job.cancel.v1`.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// Response from `admin.stats.v1`.
#[derive(Debug, Clone, Deserialize)]
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

/// Response from `admin.maintenance.v1`.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceResponse {
    pub swept: bool,
}
