//! Geostage Orchestrator SDK — Rust client library.
//!
//! Provides a convenient client for interacting with a running
//! geostage-orchestrator daemon over JSON-RPC.
//!
//! # Example
//!
//! ```no_run
//! use geostage_sdk::GeostageClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GeostageClient::connect("http://127.0.0.1:9527").await?;
//!
//!     let response = client
//!         .submit_job("echo", json!({"message": "hello"}))
//!         .await?;
//!
//!     println!("Job submitted: {}", response.job_id);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::GeostageClient;
pub use error::{Result, SdkError};
pub use types::{
    CancelJobRequest, CancelJobResponse, JobStatusRequest, JobStatusResponse, MaintenanceResponse, StatsResponse,
    SubmitJobRequest, SubmitJobResponse,
};
