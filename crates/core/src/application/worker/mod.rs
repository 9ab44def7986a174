// Worker loops: one jobs-message consumer, one or more task-message
// consumers, each pulling leased deliveries off the Message Bus and
// driving them through CoreMachine. Long handler invocations prove
// liveness via `StoreHeartbeatSink`, which renews both the State Store
// heartbeat and the bus lease.

mod constants;
mod shutdown;

pub use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::domain::TaskId;
use crate::port::{HeartbeatSink, MessageBus, StateStore, TimeProvider};
use crate::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::core_machine::CoreMachine;

/// Renews a claimed task's liveness signal. Wired into `TaskContext` for
/// each handler invocation: every `beat()` renews both the State Store
/// heartbeat (what the janitor's stalled-task sweep checks) and the bus
/// delivery's visibility lease (what keeps the still-in-flight message
/// from expiring and being dead-lettered out from under the handler).
pub struct StoreHeartbeatSink {
    pub store: Arc<dyn StateStore>,
    pub bus: Arc<dyn MessageBus>,
    pub task_id: TaskId,
    pub delivery_id: i64,
    pub lease_millis: i64,
    pub time: Arc<dyn TimeProvider>,
}

#[async_trait::async_trait]
impl HeartbeatSink for StoreHeartbeatSink {
    async fn beat(&self) -> Result<()> {
        self.store.heartbeat(&self.task_id, self.time.now_millis()).await?;
        self.bus.renew_task_lease(self.delivery_id, self.lease_millis).await?;
        Ok(())
    }
}

/// Pulls jobs messages off the bus and drives stage activation until
/// told to shut down.
pub async fn run_jobs_consumer(
    machine: Arc<CoreMachine>,
    bus: Arc<dyn MessageBus>,
    mut shutdown: ShutdownToken,
    lease_millis: i64,
) {
    loop {
        if shutdown.is_shutting_down() {
            info!("jobs consumer shutting down");
            return;
        }

        match bus.receive_jobs_message(lease_millis).await {
            Ok(Some(delivery)) => {
                let correlation_id = delivery.payload.correlation_id.clone();
                if let Err(err) = machine.handle_jobs_message(delivery.payload, &correlation_id).await {
                    error!(error = %err, "jobs message handling failed");
                }
                if let Err(err) = bus.ack_jobs_message(delivery.delivery_id).await {
                    error!(error = %err, "failed to ack jobs message");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(IDLE_SLEEP_MS)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "jobs consumer receive error");
                tokio::time::sleep(std::time::Duration::from_millis(ERROR_RECOVERY_SLEEP_MS)).await;
            }
        }
    }
}

/// Pulls task messages off the bus and drives task execution until told
/// to shut down.
pub async fn run_tasks_consumer(
    machine: Arc<CoreMachine>,
    bus: Arc<dyn MessageBus>,
    mut shutdown: ShutdownToken,
    lease_millis: i64,
) {
    loop {
        if shutdown.is_shutting_down() {
            info!("tasks consumer shutting down");
            return;
        }

        match bus.receive_task_message(lease_millis).await {
            Ok(Some(delivery)) => {
                let delivery_id = delivery.delivery_id;
                let machine = machine.clone();
                let msg = delivery.payload;
                let task_id = msg.task_id.clone();
                let result =
                    tokio::task::spawn(async move { machine.handle_task_message(msg, delivery_id, lease_millis).await })
                        .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(task_id, error = %err, "task message handling failed"),
                    Err(join_err) => error!(task_id, error = %join_err, "task consumer task panicked"),
                }

                if let Err(err) = bus.ack_task_message(delivery_id).await {
                    error!(error = %err, "failed to ack task message");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(IDLE_SLEEP_MS)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "tasks consumer receive error");
                tokio::time::sleep(std::time::Duration::from_millis(ERROR_RECOVERY_SLEEP_MS)).await;
            }
        }
    }
}
