use async_trait::async_trait;
use geostage_core::port::{HandlerError, TaskContext, TaskHandler};
use serde_json::{json, Value};
use std::time::Duration;

/// Echoes its `msg` parameter back unchanged (S1).
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn invoke(&self, parameters: Value, _ctx: &TaskContext) -> Result<Value, HandlerError> {
        let msg = parameters
            .get("msg")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::invalid_input("missing `msg` parameter"))?;
        Ok(json!({ "echoed": msg }))
    }
}

/// Squares its `i` parameter (S2 fan-out).
pub struct ArithmeticSquareHandler;

#[async_trait]
impl TaskHandler for ArithmeticSquareHandler {
    async fn invoke(&self, parameters: Value, _ctx: &TaskContext) -> Result<Value, HandlerError> {
        let i = parameters
            .get("i")
            .and_then(Value::as_i64)
            .ok_or_else(|| HandlerError::invalid_input("missing `i` parameter"))?;
        Ok(json!({ "i": i * i }))
    }
}

/// Sums the `values` array parameter (S3 cross-stage reference).
pub struct SumHandler;

#[async_trait]
impl TaskHandler for SumHandler {
    async fn invoke(&self, parameters: Value, _ctx: &TaskContext) -> Result<Value, HandlerError> {
        let values = parameters
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| HandlerError::invalid_input("missing `values` parameter"))?;
        let sum: i64 = values.iter().filter_map(Value::as_i64).sum();
        Ok(json!({ "sum": sum }))
    }
}

/// Sleeps for `duration_ms`, calling `ctx.heartbeat.beat()` every
/// `heartbeat_interval_ms` — demonstrates a handler that outlives a
/// single lease/heartbeat timeout by proving liveness itself.
pub struct LongRunningHandler;

#[async_trait]
impl TaskHandler for LongRunningHandler {
    async fn invoke(&self, parameters: Value, ctx: &TaskContext) -> Result<Value, HandlerError> {
        let duration_ms = parameters
            .get("duration_ms")
            .and_then(Value::as_i64)
            .ok_or_else(|| HandlerError::invalid_input("missing `duration_ms` parameter"))?;
        let heartbeat_interval_ms = parameters
            .get("heartbeat_interval_ms")
            .and_then(Value::as_i64)
            .unwrap_or(duration_ms.max(1));

        let mut remaining = duration_ms;
        while remaining > 0 {
            let step = remaining.min(heartbeat_interval_ms);
            tokio::time::sleep(Duration::from_millis(step.max(0) as u64)).await;
            remaining -= step;
            ctx.heartbeat
                .beat()
                .await
                .map_err(|err| HandlerError::transient(format!("heartbeat failed: {err}")))?;
        }

        Ok(json!({ "ran_ms": duration_ms }))
    }
}
