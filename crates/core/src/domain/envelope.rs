// Envelope Domain Model
// The unit of work handed from producers to consumers

use super::notification::{MessageType, Notification};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Message ID (UUID v4)
pub type MessageId = String;

/// Correlation identifier copied from the originating request.
///
/// Only ever used for log correlation; never for routing or ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TraceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Immutable notification plus its correlation metadata.
///
/// Cloning is cheap: clones share the same payload. No field can be changed
/// after construction, so whichever consumer dequeues the envelope can read it
/// without coordination.
#[derive(Clone)]
pub struct Envelope {
    id: MessageId,
    trace_id: Option<TraceId>,
    created_at_ms: i64,
    message_type: MessageType,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Envelope {
    pub fn new<N: Notification>(
        id: impl Into<MessageId>,
        trace_id: Option<TraceId>,
        created_at_ms: i64,
        notification: N,
    ) -> Self {
        Self {
            id: id.into(),
            trace_id,
            created_at_ms,
            message_type: MessageType::of::<N>(),
            payload: Arc::new(notification),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Trace id for log fields ("-" when the request carried none)
    pub fn trace_label(&self) -> &str {
        self.trace_id.as_ref().map(TraceId::as_str).unwrap_or("-")
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn is<N: Notification>(&self) -> bool {
        self.message_type == MessageType::of::<N>()
    }

    /// Borrow the payload as its concrete type
    pub fn downcast_ref<N: Notification>(&self) -> Option<&N> {
        (*self.payload).downcast_ref::<N>()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("trace_id", &self.trace_id)
            .field("created_at_ms", &self.created_at_ms)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct AppOpened {
        device: String,
    }
    impl Notification for AppOpened {}

    #[derive(Debug)]
    struct OtpRequested;
    impl Notification for OtpRequested {}

    #[test]
    fn test_envelope_exposes_payload_by_type() {
        let env = Envelope::new(
            "msg-1",
            Some(TraceId::new("req-42")),
            1_700_000_000_000,
            AppOpened {
                device: "ios".to_string(),
            },
        );

        assert!(env.is::<AppOpened>());
        assert!(!env.is::<OtpRequested>());
        assert_eq!(env.downcast_ref::<AppOpened>().unwrap().device, "ios");
        assert!(env.downcast_ref::<OtpRequested>().is_none());
        assert_eq!(env.trace_label(), "req-42");
    }

    #[test]
    fn test_clones_share_payload() {
        let env = Envelope::new("msg-2", None, 0, OtpRequested);
        let clone = env.clone();

        assert_eq!(clone.id(), "msg-2");
        assert!(Arc::ptr_eq(&env.payload, &clone.payload));
        assert_eq!(clone.trace_label(), "-");
    }

    #[test]
    fn test_trace_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&TraceId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
