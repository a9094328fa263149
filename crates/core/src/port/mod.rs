// Port Layer - Interfaces for external collaborators

pub mod dispatcher;
pub mod handler;
pub mod id_provider; // For deterministic testing
pub mod scope;
pub mod time_provider;

// Re-exports
pub use dispatcher::{DispatchError, Dispatcher};
pub use handler::{HandlerContext, HandlerError, NotificationHandler};
pub use id_provider::IdProvider;
pub use scope::{Scope, ScopeProvider};
pub use time_provider::TimeProvider;
