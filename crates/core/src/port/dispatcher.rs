// Dispatcher Port
// Abstraction for handing one envelope to its registered handlers

use crate::domain::Envelope;
use crate::port::{HandlerError, Scope};
use async_trait::async_trait;
use thiserror::Error;

/// Dispatch errors (contained by the consumer loop, never propagated)
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Handler {handler} failed for {message_type}: {source}")]
    Handler {
        handler: &'static str,
        message_type: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("Scope creation failed: {0}")]
    Scope(String),
}

/// Dispatcher trait
///
/// Implementations:
/// - HandlerRegistry: typed handler map built at composition time
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run every handler registered for the envelope's type
    ///
    /// Returns the number of handlers invoked (0 when none is registered).
    ///
    /// # Errors
    /// - DispatchError::Handler on the first handler failure; later handlers
    ///   for the same envelope are skipped
    async fn dispatch(&self, envelope: &Envelope, scope: &Scope) -> Result<usize, DispatchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock dispatcher behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed (one handler)
        Success,
        /// No handler registered
        Unhandled,
        /// Always fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Succeed after sleeping
        Sleep(Duration),
    }

    /// Mock Dispatcher recording every envelope it sees
    pub struct MockDispatcher {
        behavior: Arc<Mutex<MockBehavior>>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl MockDispatcher {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }
        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }
        pub fn new_sleeping(duration: Duration) -> Self {
            Self::new(MockBehavior::Sleep(duration))
        }
        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }
        pub fn call_count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
        /// Message ids in dispatch order
        pub fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dispatcher for MockDispatcher {
        async fn dispatch(&self, envelope: &Envelope, _scope: &Scope) -> Result<usize, DispatchError> {
            self.seen.lock().unwrap().push(envelope.id().to_string());

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => Ok(1),
                MockBehavior::Unhandled => Ok(0),
                MockBehavior::Fail(msg) => Err(DispatchError::Handler {
                    handler: "MockHandler",
                    message_type: envelope.message_type().name(),
                    source: HandlerError::Failed(msg),
                }),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(1)
                }
            }
        }
    }
}
