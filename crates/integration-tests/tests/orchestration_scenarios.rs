//! Cross-cutting end-to-end scenarios driving the real `SqliteStateStore`
//! + `SqliteMessageBus` + `CoreMachine`/`EntryShim`/`Janitor` stack against
//! the demo job specs (no mocks, no stubbed ports).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geostage_core::application::worker::{run_jobs_consumer, run_tasks_consumer, shutdown_channel};
use geostage_core::application::{CoreMachine, EntryShim, HandlerRegistry, Janitor, JanitorConfig, JobRegistry};
use geostage_core::domain::{Job, JobStatus, StageOutcome, TaskStatus};
use geostage_core::port::id_provider::UuidProvider;
use geostage_core::port::time_provider::SystemTimeProvider;
use geostage_core::port::{MessageBus, StateStore, TaskOutcome};
use geostage_demo_jobs::{
    ArithmeticSquareHandler, EchoHandler, EchoJobSpec, FanOutSquaresJobSpec, LongRunningHandler, LongRunningJobSpec, SumHandler,
    TimeoutDemoJobSpec, TwoStageSumJobSpec,
};
use geostage_infra_sqlite::{create_pool, run_migrations, SqliteMessageBus, SqliteStateStore};

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

struct TestSystem {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn MessageBus>,
    entry_shim: Arc<EntryShim>,
    shutdown_tx: geostage_core::application::ShutdownSender,
    jobs_handle: tokio::task::JoinHandle<()>,
    task_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TestSystem {
    async fn start() -> Self {
        // `sqlite::memory:` hands out a fresh empty database per pool
        // connection, which breaks a multi-connection pool; use a
        // uniquely-named on-disk file instead, matching a real deployment.
        let id = DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("geostage-orchestration-scenarios-{}-{}.db", std::process::id(), id));
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let pool = create_pool(&url).await.expect("pool creation failed");
        run_migrations(&pool).await.expect("migrations failed");

        let time = Arc::new(SystemTimeProvider);
        let ids = Arc::new(UuidProvider);
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(pool.clone()));
        let bus: Arc<dyn MessageBus> = Arc::new(SqliteMessageBus::new(pool.clone()));

        let mut jobs = JobRegistry::new();
        jobs.register(Arc::new(EchoJobSpec));
        jobs.register(Arc::new(FanOutSquaresJobSpec));
        jobs.register(Arc::new(TwoStageSumJobSpec));
        jobs.register(Arc::new(LongRunningJobSpec));
        jobs.register(Arc::new(TimeoutDemoJobSpec { task_timeout_ms: 60 }));
        let jobs = Arc::new(jobs);

        let mut handlers = HandlerRegistry::new();
        handlers.register("echo", Arc::new(EchoHandler));
        handlers.register("arithmetic_square", Arc::new(ArithmeticSquareHandler));
        handlers.register("sum", Arc::new(SumHandler));
        handlers.register("long_running", Arc::new(LongRunningHandler));
        let handlers = Arc::new(handlers);

        let machine = Arc::new(CoreMachine::new(store.clone(), bus.clone(), jobs.clone(), handlers, time.clone()));
        let entry_shim = Arc::new(EntryShim::new(store.clone(), bus.clone(), jobs, time, ids));

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let jobs_handle = tokio::spawn(run_jobs_consumer(machine.clone(), bus.clone(), shutdown_rx.clone(), 30_000));
        let task_handles = (0..2)
            .map(|_| tokio::spawn(run_tasks_consumer(machine.clone(), bus.clone(), shutdown_rx.clone(), 120_000)))
            .collect();

        Self {
            store,
            bus,
            entry_shim,
            shutdown_tx,
            jobs_handle,
            task_handles,
        }
    }

    async fn shutdown(self) {
        self.shutdown_tx.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.jobs_handle).await;
        for h in self.task_handles {
            let _ = tokio::time::timeout(Duration::from_secs(5), h).await;
        }
    }

    /// Poll the store until the job reaches a terminal status or the
    /// timeout elapses.
    async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> Job {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.store.get_job(job_id).await.unwrap().expect("job must exist");
            if job.status.is_terminal() {
                return job;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("job {job_id} did not reach a terminal status within {timeout:?}, last seen: {job:?}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll until `stage` has at least `count` materialized tasks.
    async fn wait_for_stage_tasks(&self, job_id: &str, stage: i64, count: usize, timeout: Duration) -> Vec<geostage_core::domain::Task> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let tasks = self.store.find_tasks_by_stage(&job_id.to_string(), stage).await.unwrap();
            if tasks.len() >= count {
                return tasks;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("stage {stage} of job {job_id} never reached {count} tasks");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// S1: single-stage echo job runs to completion end-to-end.
#[tokio::test]
async fn single_stage_echo_job_completes() {
    let sys = TestSystem::start().await;

    let outcome = sys
        .entry_shim
        .submit_job("ECHO", serde_json::json!({ "msg": "hello" }))
        .await
        .expect("submit failed");

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Completed);
    // Default `aggregate_results` concatenates per-stage aggregates, each
    // of which is itself an array of per-task results (ordered by task
    // id): one stage, one task -> doubly-nested single-element arrays.
    assert_eq!(job.result, Some(serde_json::json!([[{ "echoed": "hello" }]])));

    sys.shutdown().await;
}

/// S2: fan-out of five tasks in a single stage, all must complete and
/// aggregate in task-id order.
#[tokio::test]
async fn fan_out_job_aggregates_all_five_results() {
    let sys = TestSystem::start().await;

    let outcome = sys
        .entry_shim
        .submit_job("FAN_OUT_SQUARES", serde_json::json!({}))
        .await
        .expect("submit failed");

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Completed);

    let result = job.result.expect("completed job must carry a result");
    let stage_one = result.as_array().unwrap()[0].as_array().unwrap();
    let mut values: Vec<i64> = stage_one.iter().map(|v| v["i"].as_i64().unwrap()).collect();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 4, 9, 16]);

    sys.shutdown().await;
}

/// S3: two-stage job where stage 2 consumes stage 1's aggregated results.
#[tokio::test]
async fn two_stage_job_passes_prior_results_across_stages() {
    let sys = TestSystem::start().await;

    let outcome = sys
        .entry_shim
        .submit_job("TWO_STAGE_SUM", serde_json::json!({}))
        .await
        .expect("submit failed");

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_stages, 2);
    assert!(job.stage_results.contains_key(&1));

    // result = [stage1_aggregate, stage2_aggregate]; stage 2 has one task.
    let result = job.result.expect("completed job must carry a result");
    assert_eq!(result[1][0]["sum"].as_i64().unwrap(), 1 + 4);

    sys.shutdown().await;
}

/// S4: a task stuck PROCESSING past its heartbeat timeout is reclaimed by
/// the janitor, and the job still reaches completion.
#[tokio::test]
async fn janitor_recovers_a_stalled_task() {
    let sys = TestSystem::start().await;

    let outcome = sys
        .entry_shim
        .submit_job("ECHO", serde_json::json!({ "msg": "stall-me" }))
        .await
        .expect("submit failed");

    let tasks = sys.wait_for_stage_tasks(&outcome.job_id, 1, 1, Duration::from_secs(5)).await;
    let task_id = tasks[0].id.clone();

    // Steal the task into PROCESSING directly, bypassing the task
    // consumer, to simulate a worker that died mid-handler.
    let claimed = sys.store.claim_task_for_processing(&task_id, 0).await.unwrap();
    assert!(claimed.is_some(), "expected to steal the task into PROCESSING before any consumer finishes it");

    let config = JanitorConfig {
        task_heartbeat_timeout_ms: 1,
        job_stall_timeout_ms: 600_000,
        sweep_batch_size: 100,
    };
    let janitor = Janitor::new(sys.store.clone(), sys.bus.clone(), Arc::new(SystemTimeProvider), config);
    tokio::time::sleep(Duration::from_millis(5)).await;
    janitor.sweep().await.expect("sweep failed");

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Completed);

    sys.shutdown().await;
}

/// S5: a permanently-failing task cascades to sibling cancellation and a
/// FAILED job, under the default `StageOnAnyFail::Stop` policy.
#[tokio::test]
async fn permanent_handler_failure_cascades_to_job_failure() {
    let sys = TestSystem::start().await;

    // `invalid_task_index` makes one sibling's parameters bad from the
    // moment the stage is activated (rather than racing a post-hoc SQL
    // edit against the consumers already polling for it), so
    // `ArithmeticSquareHandler`'s `invalid_input` path deterministically
    // fires for that task every run.
    let outcome = sys
        .entry_shim
        .submit_job("FAN_OUT_SQUARES", serde_json::json!({ "invalid_task_index": 2 }))
        .await
        .expect("submit failed");

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Failed);

    // Every sibling must be terminal: the sabotaged task FAILED directly,
    // the rest either raced to COMPLETED before the cascade or were
    // cancelled (FAILED) by it — none may be left QUEUED/PROCESSING.
    let siblings = sys.store.find_tasks_by_stage(&outcome.job_id, 1).await.unwrap();
    assert!(siblings.iter().all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed)));
    let sabotaged = siblings
        .iter()
        .find(|t| t.parameters == serde_json::json!({}))
        .expect("sabotaged sibling must exist");
    assert_eq!(sabotaged.status, TaskStatus::Failed);

    sys.shutdown().await;
}

/// S6: redelivering an already-acked task message must not double-apply
/// its completion (idempotent `complete_task_and_check_stage`).
#[tokio::test]
async fn duplicate_task_completion_is_idempotent() {
    let sys = TestSystem::start().await;

    let outcome = sys
        .entry_shim
        .submit_job("ECHO", serde_json::json!({ "msg": "dup" }))
        .await
        .expect("submit failed");

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Completed);

    let task = sys.store.find_tasks_by_stage(&outcome.job_id, 1).await.unwrap().remove(0);

    // Replay the task's terminal completion directly against the store,
    // simulating a redelivered TaskMessage processed after the original
    // ack. It must short-circuit without re-aggregating or re-publishing.
    let completion = sys
        .store
        .complete_task_and_check_stage(&task.id, TaskOutcome::Success(serde_json::json!({ "echoed": "dup" })), 0)
        .await
        .expect("idempotent replay must not error");
    assert!(matches!(completion.outcome, StageOutcome::StageContinues));

    let job_after = sys.store.get_job(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job_after.status, JobStatus::Completed);
    assert_eq!(job_after.result, job.result);

    sys.shutdown().await;
}

/// A handler that calls `ctx.heartbeat.beat()` on its own schedule must
/// survive an aggressive janitor sweep racing against its own (longer)
/// execution: `beat()` renews both the State Store heartbeat and the bus
/// lease, so neither the stalled-task sweep nor a lease expiry reclaims it.
#[tokio::test]
async fn long_running_handler_survives_concurrent_janitor_sweeps() {
    let sys = TestSystem::start().await;

    let outcome = sys
        .entry_shim
        .submit_job("LONG_RUNNING", serde_json::json!({ "duration_ms": 300, "heartbeat_interval_ms": 20 }))
        .await
        .expect("submit failed");

    // Race a janitor sweep with a heartbeat timeout far shorter than the
    // handler's total runtime against the handler's own execution.
    let config = JanitorConfig {
        task_heartbeat_timeout_ms: 50,
        job_stall_timeout_ms: 600_000,
        sweep_batch_size: 100,
    };
    let janitor = Janitor::new(sys.store.clone(), sys.bus.clone(), Arc::new(SystemTimeProvider), config);
    let sweeper = tokio::spawn(async move {
        for _ in 0..15 {
            let _ = janitor.sweep().await;
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
    });

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    let _ = sweeper.await;

    assert_eq!(job.status, JobStatus::Completed);
    let task = sys.store.find_tasks_by_stage(&outcome.job_id, 1).await.unwrap().remove(0);
    assert_eq!(task.attempt_count, 1, "heartbeats should have kept the task from being reclaimed and retried");

    sys.shutdown().await;
}

/// A handler exceeding its job's per-taskType wall-clock budget is
/// aborted and classified TIMEOUT (retryable); once retries are
/// exhausted the task — and, being the stage's only task, the job —
/// terminates FAILED rather than hanging forever.
#[tokio::test]
async fn handler_timeout_classifies_as_transient_and_exhausts_to_failure() {
    let sys = TestSystem::start().await;

    // duration_ms far exceeds TIMEOUT_DEMO's 60ms task_timeout_ms and
    // heartbeat_interval_ms defaults to duration_ms, so the handler never
    // gets to call `beat()` before the wall clock timeout fires.
    let outcome = sys
        .entry_shim
        .submit_job("TIMEOUT_DEMO", serde_json::json!({ "duration_ms": 5_000 }))
        .await
        .expect("submit failed");

    let job = sys.wait_for_terminal(&outcome.job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Failed);

    let task = sys.store.find_tasks_by_stage(&outcome.job_id, 1).await.unwrap().remove(0);
    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error_context.expect("failed task must carry error context");
    assert_eq!(error.kind, geostage_core::domain::ErrorKind::Timeout);

    sys.shutdown().await;
}
