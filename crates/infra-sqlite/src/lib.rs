// SQLite adapter for the State Store port.

mod connection;
mod error_mapping;
mod message_bus;
mod migration;
mod rows;
mod state_store;

pub use connection::create_pool;
pub use message_bus::SqliteMessageBus;
pub use migration::run_migrations;
pub use state_store::SqliteStateStore;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
