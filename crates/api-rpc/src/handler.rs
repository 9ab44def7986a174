//! RPC Method Handlers
//!
//! Thin translation from JSON-RPC params to the core's Entry Shim and
//! State Store: validate, call the core, return status. No orchestration
//! logic lives here (component design §4.5 — HTTP/RPC entry points only
//! validate and enqueue).

use crate::error::to_rpc_error;
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CancelJobRequest, CancelJobResponse, JobStatusRequest, JobStatusResponse, MaintenanceRequest, MaintenanceResponse,
    StatsRequest, StatsResponse, SubmitJobRequest, SubmitJobResponse,
};
use geostage_core::application::{EntryShim, Janitor, JobControl};
use geostage_core::error::AppError;
use geostage_core::port::{StateStore, TimeProvider};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;

pub struct RpcHandler {
    entry_shim: Arc<EntryShim>,
    store: Arc<dyn StateStore>,
    job_control: JobControl,
    janitor: Arc<Janitor>,
    time: Arc<dyn TimeProvider>,
    rate_limiter: Arc<RateLimiter>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(
        entry_shim: Arc<EntryShim>,
        store: Arc<dyn StateStore>,
        janitor: Arc<Janitor>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let max_burst: u32 = std::env::var("GEOSTAGE_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);
        let rate_per_sec: u32 = std::env::var("GEOSTAGE_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            job_control: JobControl::new(store.clone()),
            entry_shim,
            store,
            janitor,
            time,
            rate_limiter: Arc::new(RateLimiter::new(max_burst, rate_per_sec)),
            start_time: std::time::Instant::now(),
        }
    }

    async fn check_rate_limit(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.check().await {
            Ok(())
        } else {
            Err(ErrorObjectOwned::owned(
                crate::error::code::THROTTLED,
                "rate limit exceeded, please slow down",
                None::<()>,
            ))
        }
    }

    /// `job.submit.v1`
    pub async fn submit_job(&self, params: SubmitJobRequest) -> Result<SubmitJobResponse, ErrorObjectOwned> {
        self.check_rate_limit().await?;

        let outcome = self
            .entry_shim
            .submit_job(&params.job_type, params.parameters)
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitJobResponse {
            job_id: outcome.job_id,
            status: outcome.status.to_string(),
        })
    }

    /// `job.status.v1`
    pub async fn job_status(&self, params: JobStatusRequest) -> Result<JobStatusResponse, ErrorObjectOwned> {
        let job = self
            .store
            .get_job(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| to_rpc_error(AppError::NotFound(format!("job {} not found", params.job_id))))?;

        Ok(JobStatusResponse {
            job_id: job.id,
            job_type: job.job_type,
            status: job.status.to_string(),
            current_stage: job.current_stage,
            total_stages: job.total_stages,
            stage_results: job.stage_results,
            result: job.result,
            error_details: job.error_details,
        })
    }

    /// `job.cancel.v1`
    pub async fn cancel_job(&self, params: CancelJobRequest) -> Result<CancelJobResponse, ErrorObjectOwned> {
        self.check_rate_limit().await?;

        let now = self.time.now_millis();
        let cancelled = self
            .job_control
            .cancel_job(&params.job_id, now)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelJobResponse {
            job_id: params.job_id,
            cancelled,
        })
    }

    /// `admin.stats.v1`
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let stats = self.store.stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            jobs_total: stats.jobs_total,
            jobs_processing: stats.jobs_processing,
            jobs_terminal: stats.jobs_terminal,
            tasks_total: stats.tasks_total,
            tasks_queued: stats.tasks_queued,
            tasks_processing: stats.tasks_processing,
            tasks_terminal: stats.tasks_terminal,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// `admin.maintenance.v1`
    pub async fn maintenance(&self, _params: MaintenanceRequest) -> Result<MaintenanceResponse, ErrorObjectOwned> {
        self.janitor.sweep().await.map_err(to_rpc_error)?;
        Ok(MaintenanceResponse { swept: true })
    }
}
