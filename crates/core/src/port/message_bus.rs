// Message Bus port: the at-least-once, leased-delivery queue abstraction
// between entry shims / CoreMachine stages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsMessage {
    pub job_id: String,
    pub job_type: String,
    pub stage: i64,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub job_id: String,
    pub task_id: String,
    pub stage: i64,
    pub task_type: String,
    pub correlation_id: String,
}

/// A leased delivery: `payload` plus the handle needed to ack/nack it.
pub struct Delivery<T> {
    pub payload: T,
    pub delivery_id: i64,
    pub delivery_count: i32,
}

/// Two logical queues (`jobs`, `tasks`) with at-least-once delivery and a
/// per-message visibility lease. Redelivery count is tracked so a task
/// queue can be configured with `max_delivery_count = 1`: retries are
/// governed by task state in the State Store, not by bus redelivery.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish_jobs_message(&self, msg: JobsMessage) -> crate::Result<()>;

    async fn publish_task_message(&self, msg: TaskMessage) -> crate::Result<()>;

    /// Batch form used when a stage's fan-out exceeds the JobSpec's batch
    /// threshold; logically equivalent to calling `publish_task_message`
    /// once per message.
    async fn publish_task_messages(&self, msgs: Vec<TaskMessage>) -> crate::Result<()> {
        for msg in msgs {
            self.publish_task_message(msg).await?;
        }
        Ok(())
    }

    /// Durable delayed-visibility retry: publish `msg` so it only becomes
    /// eligible for delivery at `visible_at_millis`. Unlike an in-process
    /// timer, this survives a process restart — the due time lives in the
    /// bus row and is enforced by `receive_task_message`'s own visibility
    /// check, the same mechanism lease timeouts use.
    async fn publish_task_message_after(&self, msg: TaskMessage, visible_at_millis: i64) -> crate::Result<()>;

    /// Claim up to one visible message from the jobs queue, leasing it
    /// for `lease_millis`.
    async fn receive_jobs_message(&self, lease_millis: i64) -> crate::Result<Option<Delivery<JobsMessage>>>;

    async fn receive_task_message(&self, lease_millis: i64) -> crate::Result<Option<Delivery<TaskMessage>>>;

    async fn ack_jobs_message(&self, delivery_id: i64) -> crate::Result<()>;

    async fn ack_task_message(&self, delivery_id: i64) -> crate::Result<()>;

    /// Extend an in-flight task message's visibility lease; used by long
    /// handlers via the heartbeat sink so the bus doesn't redeliver work
    /// that is still legitimately in progress.
    async fn renew_task_lease(&self, delivery_id: i64, lease_millis: i64) -> crate::Result<()>;
}
