// SQLite-backed Message Bus: two lease tables (`bus_jobs_messages`,
// `bus_tasks_messages`) standing in for the `jobs`/`tasks` queues of
// component design §4.2. A message is "visible" once `visible_at <= now`;
// receiving a message advances `visible_at` past the lease (the SQLite
// equivalent of a broker's visibility timeout) and bumps `delivery_count`.
//
// Task queues are pinned to `maxDeliveryCount = 1`: a task message is only
// ever claimed once (`delivery_count = 0` in the claim predicate). If its
// lease expires before ack, it is not redelivered — it is moved to
// `dead_letter_task_messages` on the next receive call, and recovery is
// left entirely to the Janitor's heartbeat sweep, per the broker contract.

use crate::error_mapping::map_sqlx_error;
use async_trait::async_trait;
use geostage_core::port::{Delivery, JobsMessage, MessageBus, TaskMessage};
use geostage_core::Result;
use sqlx::{Row, SqlitePool};

pub struct SqliteMessageBus {
    pool: SqlitePool,
}

impl SqliteMessageBus {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn insert_task_message(&self, msg: TaskMessage, visible_at: i64, created_at: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO bus_tasks_messages (job_id, task_id, stage, task_type, correlation_id, visible_at, delivery_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&msg.job_id)
        .bind(&msg.task_id)
        .bind(msg.stage)
        .bind(&msg.task_type)
        .bind(&msg.correlation_id)
        .bind(visible_at)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for SqliteMessageBus {
    async fn publish_jobs_message(&self, msg: JobsMessage) -> Result<()> {
        let now = Self::now_millis();
        sqlx::query(
            "INSERT INTO bus_jobs_messages (job_id, job_type, stage, correlation_id, visible_at, delivery_count, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&msg.job_id)
        .bind(&msg.job_type)
        .bind(msg.stage)
        .bind(&msg.correlation_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn publish_task_message(&self, msg: TaskMessage) -> Result<()> {
        let now = Self::now_millis();
        self.insert_task_message(msg, now, now).await
    }

    async fn publish_task_message_after(&self, msg: TaskMessage, visible_at_millis: i64) -> Result<()> {
        self.insert_task_message(msg, visible_at_millis, Self::now_millis()).await
    }

    async fn receive_jobs_message(&self, lease_millis: i64) -> Result<Option<Delivery<JobsMessage>>> {
        let now = Self::now_millis();
        let lease_until = now + lease_millis;
        let row = sqlx::query(
            "UPDATE bus_jobs_messages SET visible_at = ?, delivery_count = delivery_count + 1
             WHERE delivery_id = (
                 SELECT delivery_id FROM bus_jobs_messages WHERE visible_at <= ? ORDER BY delivery_id ASC LIMIT 1
             )
             RETURNING delivery_id, job_id, job_type, stage, correlation_id, delivery_count",
        )
        .bind(lease_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| Delivery {
            payload: JobsMessage {
                job_id: r.get("job_id"),
                job_type: r.get("job_type"),
                stage: r.get("stage"),
                correlation_id: r.get("correlation_id"),
            },
            delivery_id: r.get("delivery_id"),
            delivery_count: r.get("delivery_count"),
        }))
    }

    async fn receive_task_message(&self, lease_millis: i64) -> Result<Option<Delivery<TaskMessage>>> {
        let now = Self::now_millis();

        // Dead-letter any task message whose single delivery attempt
        // already expired without an ack (maxDeliveryCount = 1).
        let expired: Vec<(String, String, i64, String, String, i64)> = sqlx::query(
            "SELECT job_id, task_id, stage, task_type, correlation_id, delivery_count
             FROM bus_tasks_messages WHERE delivery_count >= 1 AND visible_at <= ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(|r| {
            (
                r.get("job_id"),
                r.get("task_id"),
                r.get("stage"),
                r.get("task_type"),
                r.get("correlation_id"),
                r.get("delivery_count"),
            )
        })
        .collect();

        for (job_id, task_id, stage, task_type, correlation_id, delivery_count) in expired {
            sqlx::query(
                "INSERT INTO dead_letter_task_messages (job_id, task_id, stage, task_type, correlation_id, delivery_count, dead_lettered_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&job_id)
            .bind(&task_id)
            .bind(stage)
            .bind(&task_type)
            .bind(&correlation_id)
            .bind(delivery_count)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            sqlx::query("DELETE FROM bus_tasks_messages WHERE job_id = ? AND task_id = ? AND delivery_count = ?")
                .bind(&job_id)
                .bind(&task_id)
                .bind(delivery_count)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        let lease_until = now + lease_millis;
        let row = sqlx::query(
            "UPDATE bus_tasks_messages SET visible_at = ?, delivery_count = delivery_count + 1
             WHERE delivery_id = (
                 SELECT delivery_id FROM bus_tasks_messages
                 WHERE visible_at <= ? AND delivery_count = 0
                 ORDER BY delivery_id ASC LIMIT 1
             )
             RETURNING delivery_id, job_id, task_id, stage, task_type, correlation_id, delivery_count",
        )
        .bind(lease_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| Delivery {
            payload: TaskMessage {
                job_id: r.get("job_id"),
                task_id: r.get("task_id"),
                stage: r.get("stage"),
                task_type: r.get("task_type"),
                correlation_id: r.get("correlation_id"),
            },
            delivery_id: r.get("delivery_id"),
            delivery_count: r.get("delivery_count"),
        }))
    }

    async fn ack_jobs_message(&self, delivery_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM bus_jobs_messages WHERE delivery_id = ?")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn ack_task_message(&self, delivery_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM bus_tasks_messages WHERE delivery_id = ?")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn renew_task_lease(&self, delivery_id: i64, lease_millis: i64) -> Result<()> {
        let lease_until = Self::now_millis() + lease_millis;
        sqlx::query("UPDATE bus_tasks_messages SET visible_at = ? WHERE delivery_id = ?")
            .bind(lease_until)
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn bus() -> SqliteMessageBus {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteMessageBus::new(pool)
    }

    #[tokio::test]
    async fn publish_then_receive_jobs_message() {
        let bus = bus().await;
        bus.publish_jobs_message(JobsMessage {
            job_id: "job-1".into(),
            job_type: "ECHO".into(),
            stage: 1,
            correlation_id: "corr-1".into(),
        })
        .await
        .unwrap();

        let delivery = bus.receive_jobs_message(30_000).await.unwrap().unwrap();
        assert_eq!(delivery.payload.job_id, "job-1");
        assert_eq!(delivery.delivery_count, 1);

        // Leased, so not visible again until ack or lease expiry.
        assert!(bus.receive_jobs_message(30_000).await.unwrap().is_none());

        bus.ack_jobs_message(delivery.delivery_id).await.unwrap();
        assert!(bus.receive_jobs_message(30_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_task_lease_is_dead_lettered_not_redelivered() {
        let bus = bus().await;
        bus.publish_task_message(TaskMessage {
            job_id: "job-1".into(),
            task_id: "task-1".into(),
            stage: 1,
            task_type: "echo".into(),
            correlation_id: "corr-1".into(),
        })
        .await
        .unwrap();

        let delivery = bus.receive_task_message(0).await.unwrap().unwrap();
        assert_eq!(delivery.payload.task_id, "task-1");

        // Lease of 0ms is already expired; the next receive must
        // dead-letter it rather than hand it out a second time.
        assert!(bus.receive_task_message(30_000).await.unwrap().is_none());

        let dead: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letter_task_messages")
            .fetch_one(&bus.pool)
            .await
            .unwrap();
        assert_eq!(dead, 1);
    }
}
