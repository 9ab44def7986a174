//! JSON-RPC Server
//!
//! Implements the JSON-RPC 2.0 server over TCP on localhost, the only
//! external-facing surface the orchestrator exposes (component design
//! §4.5 — validate request, call core, return status).

use crate::handler::RpcHandler;
use crate::types::{CancelJobRequest, JobStatusRequest, MaintenanceRequest, StatsRequest, SubmitJobRequest};
use geostage_core::application::{EntryShim, Janitor};
use geostage_core::port::{StateStore, TimeProvider};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;

pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        entry_shim: Arc<EntryShim>,
        store: Arc<dyn StateStore>,
        janitor: Arc<Janitor>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(entry_shim, store, janitor, time)),
        }
    }

    /// Start the JSON-RPC server.
    ///
    /// Binds only to localhost — this surface is meant to sit behind a
    /// gateway/UI process on the same host, not take untrusted traffic
    /// directly.
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(host = %self.config.host, port = %self.config.port, "starting JSON-RPC server");

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("failed to build server on {addr}: {e}"))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("job.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SubmitJobRequest = params.parse()?;
                    handler.submit_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobStatusRequest = params.parse()?;
                    handler.job_status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.cancel.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CancelJobRequest = params.parse()?;
                    handler.cancel_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsRequest = params.parse()?;
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.maintenance.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: MaintenanceRequest = params.parse()?;
                    handler.maintenance(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}
