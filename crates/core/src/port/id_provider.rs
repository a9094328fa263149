// ID Provider Port (for deterministic testing)

use std::sync::atomic::{AtomicU64, Ordering};

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique message ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential provider ("msg-1", "msg-2", ...)
#[derive(Default)]
pub struct SequentialIdProvider {
    next: AtomicU64,
}

impl SequentialIdProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdProvider for SequentialIdProvider {
    fn generate_id(&self) -> String {
        format!("msg-{}", self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
