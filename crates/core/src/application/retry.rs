// Retry backoff policy for task transient failures.

use crate::domain::Task;

/// Retry decision for a completed-with-transient-error task.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry, waiting `delay_ms` before the task becomes eligible again.
    Retry(i64),
    /// Attempts exhausted; the task must terminate FAILED.
    Exhausted,
}

const BASE_DELAY_MS: f64 = 2_000.0;
const MAX_DELAY_MS: i64 = 300_000;

/// Exponential backoff, base 2s, cap 5 min, multiplicative by attempt
/// count, jitter +/-20% seeded from the task id so retries of the same
/// task are reproducible across restarts but don't stampede in lockstep
/// with sibling tasks.
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn should_retry(&self, task: &Task) -> RetryDecision {
        if task.attempt_count >= task.max_retries {
            return RetryDecision::Exhausted;
        }

        let raw_delay_ms = BASE_DELAY_MS * 2f64.powi(task.attempt_count);
        let jitter_seed = task.id.chars().map(|c| c as u32).sum::<u32>();
        // 0.8 .. 1.2
        let jitter_factor = 0.8 + ((jitter_seed % 41) as f64 / 100.0);
        let delay_ms = ((raw_delay_ms * jitter_factor) as i64).min(MAX_DELAY_MS);

        RetryDecision::Retry(delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
