// Scope Provider Port
// Fresh dependency context per dispatch

use crate::port::{DispatchError, HandlerError};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Per-dispatch resolution context.
///
/// Created for exactly one message and dropped when its dispatch returns, so
/// two consumers never share a scope.
pub struct Scope {
    id: u64,
    services: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Scope {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            services: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.services.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub(crate) fn insert_boxed(&mut self, type_id: TypeId, value: Box<dyn Any + Send + Sync>) {
        self.services.insert(type_id, value);
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|service| service.downcast_ref::<T>())
    }

    /// Like `get`, but as a handler error when the dependency is absent
    pub fn require<T: Any + Send + Sync>(&self) -> Result<&T, HandlerError> {
        self.get::<T>()
            .ok_or(HandlerError::MissingDependency(std::any::type_name::<T>()))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("services", &self.services.len())
            .finish()
    }
}

/// Scope Provider trait
///
/// Implementations:
/// - ScopedServices: per-type factories (application layer)
pub trait ScopeProvider: Send + Sync {
    /// Produce an independent scope for one dispatch
    ///
    /// # Errors
    /// - DispatchError::Scope if a dependency cannot be constructed
    fn create_scope(&self) -> Result<Scope, DispatchError>;
}
