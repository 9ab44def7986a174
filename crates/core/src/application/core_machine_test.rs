// Unit tests for CoreMachine built entirely against MockStateStore /
// MockMessageBus — no SQLite. End-to-end scenarios (real adapters, real
// consumer loops) live in geostage-integration-tests.

use super::*;
use crate::domain::{Job, StageDef, StageOnAnyFail};
use crate::port::{MockMessageBus, MockStateStore};
use mockall::predicate::eq;
use serde_json::json;

struct TestJobSpec {
    stage_on_any_fail: StageOnAnyFail,
}

impl crate::domain::JobSpec for TestJobSpec {
    fn job_type(&self) -> &str {
        "TEST"
    }

    fn stages(&self) -> &[StageDef] {
        static STAGES: &[StageDef] = &[];
        STAGES
    }

    fn total_stages(&self) -> i64 {
        2
    }

    fn create_tasks(&self, _stage: i64, _job_parameters: &serde_json::Value, _job_id: &str, _prior_results: &[serde_json::Value]) -> Vec<TaskSpec> {
        vec![]
    }

    fn stage_on_any_fail(&self) -> StageOnAnyFail {
        self.stage_on_any_fail
    }
}

fn machine_with(store: MockStateStore, bus: MockMessageBus, spec: TestJobSpec) -> CoreMachine {
    let mut jobs = JobRegistry::new();
    jobs.register(Arc::new(spec));

    CoreMachine::new(
        Arc::new(store),
        Arc::new(bus),
        Arc::new(jobs),
        Arc::new(HandlerRegistry::new()),
        Arc::new(crate::port::time_provider::SystemTimeProvider),
    )
}

fn test_job(stage: i64) -> Job {
    let mut job = Job::new("job-1", "TEST", json!({}), 2, StageOnAnyFail::Stop, 0);
    job.current_stage = stage;
    job
}

/// A jobs message for a stage the job has already moved past (neither the
/// current stage nor the next one) must be ignored without ever touching
/// `activate_stage` — redelivery of a long-stale message is a no-op, not
/// an error.
#[tokio::test]
async fn stale_jobs_message_is_ignored_before_activation() {
    let mut store = MockStateStore::new();
    store.expect_get_job().with(eq("job-1")).returning(|_| Ok(Some(test_job(3))));
    store.expect_activate_stage().times(0);

    let machine = machine_with(store, MockMessageBus::new(), TestJobSpec { stage_on_any_fail: StageOnAnyFail::Stop });

    let msg = JobsMessage {
        job_id: "job-1".to_string(),
        job_type: "TEST".to_string(),
        stage: 1,
        correlation_id: "corr-1".to_string(),
    };
    machine.handle_jobs_message(msg, "corr-1").await.unwrap();
}

/// A task with no registered handler synthesizes a HANDLER_NOT_FOUND
/// failure instead of panicking or hanging; the failure is still fed
/// through the normal stage-completion path.
#[tokio::test]
async fn missing_handler_synthesizes_handler_not_found_failure() {
    let mut store = MockStateStore::new();
    let task = crate::domain::Task::new("task-1", "job-1", 1, "0", "nonexistent_task_type", json!({}), 3, 0);
    store
        .expect_claim_task_for_processing()
        .with(eq("task-1".to_string()), mockall::predicate::always())
        .returning(move |_, _| Ok(Some(task.clone())));
    store
        .expect_complete_task_and_check_stage()
        .withf(|_task_id, outcome, _now| matches!(outcome, TaskOutcome::Failure(ctx) if ctx.kind == crate::domain::ErrorKind::HandlerNotFound))
        .returning(|_, _, _| {
            Ok(StageCompletion {
                outcome: StageOutcome::StageContinues,
                stage: 1,
                total_stages: 2,
                aggregated: None,
            })
        });

    let machine = machine_with(store, MockMessageBus::new(), TestJobSpec { stage_on_any_fail: StageOnAnyFail::Stop });

    let msg = TaskMessage {
        job_id: "job-1".to_string(),
        task_id: "task-1".to_string(),
        stage: 1,
        task_type: "nonexistent_task_type".to_string(),
        correlation_id: "corr-1".to_string(),
    };
    machine.handle_task_message(msg, 1, 120_000).await.unwrap();
}

/// STAGE_COMPLETE_PARTIAL on a non-final stage: `StageOnAnyFail::Stop`
/// halts the job instead of advancing to the next stage.
#[tokio::test]
async fn partial_stage_completion_stops_job_under_stop_policy() {
    let mut store = MockStateStore::new();
    store.expect_get_job().with(eq("job-1")).returning(|_| Ok(Some(test_job(1))));
    store
        .expect_mark_job_failed()
        .withf(|job_id, _details, _now| job_id == "job-1")
        .returning(|_, _, _| Ok(()));

    let machine = machine_with(store, MockMessageBus::new(), TestJobSpec { stage_on_any_fail: StageOnAnyFail::Stop });

    let completion = StageCompletion {
        outcome: StageOutcome::StageCompletePartial,
        stage: 1,
        total_stages: 2,
        aggregated: Some(json!([{ "ok": true }])),
    };
    machine.act_on_stage_completion("job-1", completion, "corr-1").await.unwrap();
}

/// STAGE_COMPLETE_PARTIAL on a non-final stage: `StageOnAnyFail::Continue`
/// advances to the next stage despite the partial failure.
#[tokio::test]
async fn partial_stage_completion_advances_under_continue_policy() {
    let mut store = MockStateStore::new();
    store.expect_get_job().with(eq("job-1")).returning(|_| Ok(Some(test_job(1))));
    store.expect_mark_job_failed().times(0);

    let mut bus = MockMessageBus::new();
    bus.expect_publish_jobs_message()
        .withf(|msg| msg.job_id == "job-1" && msg.stage == 2)
        .returning(|_| Ok(()));

    let machine = machine_with(store, bus, TestJobSpec { stage_on_any_fail: StageOnAnyFail::Continue });

    let completion = StageCompletion {
        outcome: StageOutcome::StageCompletePartial,
        stage: 1,
        total_stages: 2,
        aggregated: Some(json!([{ "ok": true }])),
    };
    machine.act_on_stage_completion("job-1", completion, "corr-1").await.unwrap();
}
