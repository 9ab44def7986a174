// Worker-loop tuning constants.

/// How long a consumer sleeps after finding no message before polling again.
pub const IDLE_SLEEP_MS: u64 = 100;

/// Backoff after a bus/store error before retrying the poll.
pub const ERROR_RECOVERY_SLEEP_MS: u64 = 1_000;

/// Default heartbeat interval for long-running handlers; must be less
/// than half the message lease.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: i64 = 30_000;

/// Default message bus lease, >= 2x the heartbeat interval.
pub const DEFAULT_TASK_LEASE_MS: i64 = 120_000;

pub const DEFAULT_JOBS_LEASE_MS: i64 = 30_000;
