// Notification Handler Port
// Business reactions to notifications live behind this trait

use crate::domain::{Envelope, Notification, TraceId};
use crate::port::scope::Scope;
use async_trait::async_trait;
use thiserror::Error;

/// Handler errors
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Missing scoped dependency: {0}")]
    MissingDependency(&'static str),

    #[error("Payload is not a {0}")]
    PayloadMismatch(&'static str),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// What a handler can see besides the notification itself
pub struct HandlerContext<'a> {
    envelope: &'a Envelope,
    scope: &'a Scope,
}

impl<'a> HandlerContext<'a> {
    pub fn new(envelope: &'a Envelope, scope: &'a Scope) -> Self {
        Self { envelope, scope }
    }

    pub fn message_id(&self) -> &str {
        self.envelope.id()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.envelope.trace_id()
    }

    /// Dependencies resolved for this dispatch only
    pub fn scope(&self) -> &Scope {
        self.scope
    }
}

/// Handler for one notification type
///
/// Several handlers may be registered for the same type; the registry decides
/// their order. A handler owns its own timeouts: the consumer waits for it
/// however long it takes.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync {
    /// Name used in logs and dispatch errors
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, notification: &N, ctx: &HandlerContext<'_>) -> Result<(), HandlerError>;
}
