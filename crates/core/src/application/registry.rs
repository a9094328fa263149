// Handler Registry
// Typed dispatch table built once at composition time

use crate::domain::{Envelope, MessageType, Notification};
use crate::port::{
    DispatchError, Dispatcher, HandlerContext, HandlerError, NotificationHandler, Scope,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::debug;

/// Handler with its notification type erased
#[async_trait]
trait ErasedHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(&self, envelope: &Envelope, scope: &Scope) -> Result<(), HandlerError>;
}

struct Typed<N, H> {
    handler: H,
    _notification: PhantomData<fn(&N)>,
}

#[async_trait]
impl<N, H> ErasedHandler for Typed<N, H>
where
    N: Notification,
    H: NotificationHandler<N> + 'static,
{
    fn name(&self) -> &'static str {
        self.handler.name()
    }

    async fn invoke(&self, envelope: &Envelope, scope: &Scope) -> Result<(), HandlerError> {
        let notification = envelope
            .downcast_ref::<N>()
            .ok_or(HandlerError::PayloadMismatch(std::any::type_name::<N>()))?;
        let ctx = HandlerContext::new(envelope, scope);
        self.handler.handle(notification, &ctx).await
    }
}

/// Builder for [`HandlerRegistry`]
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<MessageType, Vec<Box<dyn ErasedHandler>>>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for notifications of type `N`.
    ///
    /// Handlers for the same type run in registration order.
    pub fn register<N, H>(mut self, handler: H) -> Self
    where
        N: Notification,
        H: NotificationHandler<N> + 'static,
    {
        self.handlers
            .entry(MessageType::of::<N>())
            .or_default()
            .push(Box::new(Typed {
                handler,
                _notification: PhantomData,
            }));
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable map from notification type to its handlers
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, Vec<Box<dyn ErasedHandler>>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn handler_count<N: Notification>(&self) -> usize {
        self.handlers
            .get(&MessageType::of::<N>())
            .map_or(0, Vec::len)
    }

    /// Handler names for a type, in invocation order
    pub fn handler_names(&self, message_type: MessageType) -> Vec<&'static str> {
        self.handlers
            .get(&message_type)
            .map(|handlers| handlers.iter().map(|h| h.name()).collect())
            .unwrap_or_default()
    }

    pub fn message_types(&self) -> Vec<MessageType> {
        self.handlers.keys().copied().collect()
    }
}

#[async_trait]
impl Dispatcher for HandlerRegistry {
    async fn dispatch(&self, envelope: &Envelope, scope: &Scope) -> Result<usize, DispatchError> {
        let message_type = envelope.message_type();
        let Some(handlers) = self.handlers.get(&message_type) else {
            debug!(message_type = %message_type, "No handler registered");
            return Ok(0);
        };

        for handler in handlers {
            handler
                .invoke(envelope, scope)
                .await
                .map_err(|source| DispatchError::Handler {
                    handler: handler.name(),
                    message_type: message_type.name(),
                    source,
                })?;
        }
        Ok(handlers.len())
    }
}
