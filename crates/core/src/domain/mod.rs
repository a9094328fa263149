// Domain Layer - Messages flowing through the broker

pub mod envelope;
pub mod notification;

// Re-exports
pub use envelope::{Envelope, MessageId, TraceId};
pub use notification::{MessageType, Notification};
