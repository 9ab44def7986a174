// Application Layer - Use Cases and Business Logic

pub mod core_machine;
pub mod entry_shim;
pub mod janitor;
pub mod job_control;
pub mod registry;
pub mod retry;
pub mod worker;

// Re-exports
pub use core_machine::CoreMachine;
pub use entry_shim::{EntryShim, SubmitOutcome};
pub use janitor::{Janitor, JanitorConfig};
pub use job_control::JobControl;
pub use registry::{HandlerRegistry, JobRegistry};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{run_jobs_consumer, run_tasks_consumer, shutdown_channel, ShutdownSender, ShutdownToken, StoreHeartbeatSink};
