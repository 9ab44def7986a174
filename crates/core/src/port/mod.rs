// Port Layer - Interfaces for external dependencies

pub mod handler;
pub mod id_provider;
pub mod message_bus;
pub mod state_store;
pub mod time_provider;

// Re-exports
pub use handler::{HandlerError, HeartbeatSink, TaskContext, TaskHandler};
pub use id_provider::IdProvider;
pub use message_bus::{Delivery, JobsMessage, MessageBus, TaskMessage};
pub use state_store::{ActivateOutcome, CreateOutcome, StageCompletion, StateStore, StoreStats, TaskOutcome};
#[cfg(test)]
pub use message_bus::MockMessageBus;
#[cfg(test)]
pub use state_store::MockStateStore;
pub use time_provider::TimeProvider;
