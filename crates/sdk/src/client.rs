//! Geostage Orchestrator client implementation.

use crate::error::{Result, SdkError};
use crate::types::{
    CancelJobRequest, CancelJobResponse, JobStatusRequest, JobStatusResponse, MaintenanceResponse, StatsResponse,
    SubmitJobRequest, SubmitJobResponse,
};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde_json::Value;
use std::time::Duration;

/// Geostage Orchestrator Client
///
/// Thin wrapper over a JSON-RPC connection to a running daemon.
///
/// # Example
///
/// ```no_run
/// use geostage_sdk::GeostageClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GeostageClient::connect("http://127.0.0.1:9527").await?;
/// # Ok(())
/// # }
/// ```
pub struct GeostageClient {
    client: HttpClient,
}

impl GeostageClient {
    /// Connect to a geostage-orchestrator daemon.
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9527`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Submit a new job. Idempotent for identical `(job_type, parameters)`.
    pub async fn submit_job(&self, job_type: impl Into<String>, parameters: Value) -> Result<SubmitJobResponse> {
        let request = SubmitJobRequest {
            job_type: job_type.into(),
            parameters,
        };
        let params = rpc_params![request];
        let response: SubmitJobResponse = self.client.request("job.submit.v1", params).await?;

        Ok(response)
    }

    /// Fetch a job's current state.
    pub async fn job_status(&self, job_id: impl Into<String>) -> Result<JobStatusResponse> {
        let request = JobStatusRequest { job_id: job_id.into() };
        let params = rpc_params![request];
        let response: JobStatusResponse = self.client.request("job.status.v1", params).await?;

        Ok(response)
    }

    /// Cancel a non-terminal job.
    pub async fn cancel_job(&self, job_id: impl Into<String>) -> Result<CancelJobResponse> {
        let request = CancelJobRequest { job_id: job_id.into() };
        let params = rpc_params![request];
        let response: CancelJobResponse = self.client.request("job.cancel.v1", params).await?;

        Ok(response)
    }

    /// Fetch aggregate job/task counts from the daemon's state store.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let params = rpc_params![];
        let response: StatsResponse = self.client.request("admin.stats.v1", params).await?;

        Ok(response)
    }

    /// Trigger an on-demand janitor sweep.
    pub async fn maintenance(&self) -> Result<MaintenanceResponse> {
        let params = rpc_params![];
        let response: MaintenanceResponse = self.client.request("admin.maintenance.v1", params).await?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let result = GeostageClient::connect("not a url").await;
        assert!(result.is_err());
    }
}
