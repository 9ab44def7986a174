//! Geostage Orchestrator — main daemon executable.
//!
//! Composition root: wires the SQLite State Store and Message Bus, the
//! Handler and Job registries, the CoreMachine, its worker consumers, the
//! Janitor sweep, and the JSON-RPC entry shim into one running process.

mod telemetry;

use anyhow::Result;
use directories::ProjectDirs;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geostage_api_rpc::{server::RpcServerConfig, RpcServer};
use geostage_core::application::worker::{run_jobs_consumer, run_tasks_consumer, shutdown_channel, DEFAULT_JOBS_LEASE_MS, DEFAULT_TASK_LEASE_MS};
use geostage_core::application::{CoreMachine, EntryShim, HandlerRegistry, Janitor, JanitorConfig, JobRegistry};
use geostage_core::port::id_provider::UuidProvider;
use geostage_core::port::time_provider::SystemTimeProvider;
use geostage_demo_jobs::{
    ArithmeticSquareHandler, EchoHandler, EchoJobSpec, FanOutSquaresJobSpec, LongRunningHandler, LongRunningJobSpec, SumHandler,
    TimeoutDemoJobSpec, TwoStageSumJobSpec,
};
use geostage_infra_sqlite::{create_pool, run_migrations, SqliteMessageBus, SqliteStateStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the project's standard data/log directories via XDG (or
/// platform-equivalent) conventions, falling back to the current
/// directory if the host has no resolvable home directory.
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "geostage", "geostage-orchestrator")
}

fn default_db_path() -> std::path::PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join("orchestrator.db"),
        None => std::path::PathBuf::from("./orchestrator.db"),
    }
}

fn default_log_dir() -> std::path::PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join("logs"),
        None => std::path::PathBuf::from("./logs"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_format = std::env::var("GEOSTAGE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("geostage=info"))
        .expect("failed to build env filter");

    // File logging is optional: set GEOSTAGE_LOG_DIR (or rely on the
    // platform data directory) to get a non-blocking daily-rolling file
    // appender alongside the stdout layer.
    let log_dir = std::env::var("GEOSTAGE_LOG_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_log_dir());
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "geostage-orchestrator.log");
    let (file_writer, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stdout_json = log_format == "json";
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_writer(file_writer).with_ansi(false));
    if stdout_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }

    info!("Geostage Orchestrator v{} starting...", VERSION);
    info!(log_dir = %log_dir.display(), "file logging enabled");

    if let Err(e) = telemetry::init_telemetry() {
        tracing::warn!(error = ?e, "failed to initialize OpenTelemetry (continuing without it)");
    }

    let db_path = std::env::var("GEOSTAGE_DB_PATH").unwrap_or_else(|_| default_db_path().display().to_string());
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let rpc_port: u16 = std::env::var("GEOSTAGE_RPC_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(9527);
    let task_consumer_count: usize = std::env::var("GEOSTAGE_TASK_CONSUMERS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);

    info!(db_path = %db_path, "initializing state store");
    let pool = create_pool(&db_path).await.map_err(|e| anyhow::anyhow!("DB pool creation failed: {e}"))?;
    run_migrations(&pool).await.map_err(|e| anyhow::anyhow!("migration failed: {e}"))?;

    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let store: Arc<dyn geostage_core::port::StateStore> = Arc::new(SqliteStateStore::new(pool.clone()));
    let bus: Arc<dyn geostage_core::port::MessageBus> = Arc::new(SqliteMessageBus::new(pool.clone()));

    // Job Registry / Handler Registry: populated once at boot, read-only
    // thereafter (component design §4, §9 — no dynamic dispatch registries).
    let mut job_registry = JobRegistry::new();
    job_registry.register(Arc::new(EchoJobSpec));
    job_registry.register(Arc::new(FanOutSquaresJobSpec));
    job_registry.register(Arc::new(TwoStageSumJobSpec));
    job_registry.register(Arc::new(LongRunningJobSpec));
    job_registry.register(Arc::new(TimeoutDemoJobSpec { task_timeout_ms: 2_000 }));
    let job_registry = Arc::new(job_registry);

    let mut handler_registry = HandlerRegistry::new();
    handler_registry.register("echo", Arc::new(EchoHandler));
    handler_registry.register("arithmetic_square", Arc::new(ArithmeticSquareHandler));
    handler_registry.register("sum", Arc::new(SumHandler));
    handler_registry.register("long_running", Arc::new(LongRunningHandler));
    let handler_registry = Arc::new(handler_registry);

    let machine = Arc::new(CoreMachine::new(
        store.clone(),
        bus.clone(),
        job_registry.clone(),
        handler_registry,
        time_provider.clone(),
    ));

    let entry_shim = Arc::new(EntryShim::new(
        store.clone(),
        bus.clone(),
        job_registry,
        time_provider.clone(),
        id_provider,
    ));

    let janitor = Arc::new(Janitor::new(store.clone(), bus.clone(), time_provider.clone(), JanitorConfig::default()));

    info!("starting JSON-RPC entry shim...");
    let rpc_config = RpcServerConfig { port: rpc_port, ..Default::default() };
    let rpc_server = RpcServer::new(rpc_config, entry_shim, store.clone(), janitor.clone(), time_provider.clone());
    let rpc_handle = rpc_server.start().await.map_err(|e| anyhow::anyhow!("RPC server start failed: {e}"))?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    info!("starting jobs consumer...");
    let jobs_consumer_handle = tokio::spawn(run_jobs_consumer(machine.clone(), bus.clone(), shutdown_rx.clone(), DEFAULT_JOBS_LEASE_MS));

    info!(count = task_consumer_count, "starting task consumers...");
    let mut task_consumer_handles = Vec::with_capacity(task_consumer_count);
    for _ in 0..task_consumer_count {
        task_consumer_handles.push(tokio::spawn(run_tasks_consumer(
            machine.clone(),
            bus.clone(),
            shutdown_rx.clone(),
            DEFAULT_TASK_LEASE_MS,
        )));
    }

    info!("starting janitor sweep...");
    let mut janitor_shutdown = shutdown_rx;
    let janitor_handle = tokio::spawn(async move {
        loop {
            if janitor_shutdown.is_shutting_down() {
                return;
            }
            if let Err(err) = janitor.sweep().await {
                tracing::error!(error = %err, "janitor sweep failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {}
                _ = janitor_shutdown.changed() => {}
            }
        }
    });

    info!("system ready, waiting for jobs");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting gracefully...");

    shutdown_tx.shutdown();
    rpc_handle.stop().map_err(|e| anyhow::anyhow!("RPC server stop failed: {e}"))?;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), jobs_consumer_handle).await;
    for handle in task_consumer_handles {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), janitor_handle).await;

    info!("shutdown complete");
    Ok(())
}
