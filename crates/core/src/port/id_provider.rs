// ID Provider Port (for deterministic testing)
//
// Job and task ids are derived deterministically (domain::ids) and do not
// go through this provider. This port is for identifiers that are allowed
// (and expected) to vary between deliveries, such as a message correlation
// id used purely for tracing.

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique correlation id.
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
