// Scoped Services
// Default ScopeProvider: per-type factories run once per dispatch

use crate::port::{DispatchError, Scope, ScopeProvider};
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};

type Factory = Box<dyn Fn() -> Result<Box<dyn Any + Send + Sync>, String> + Send + Sync>;

/// Registered factories producing request-scoped dependencies
///
/// Every call to `create_scope` runs every factory again, so concurrent
/// dispatches never observe each other's instances (e.g. each message gets its
/// own storage context).
#[derive(Default)]
pub struct ScopedServices {
    factories: Vec<(TypeId, &'static str, Factory)>,
    next_scope_id: AtomicU64,
}

impl ScopedServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an infallible factory for `T`
    pub fn add<T, F>(self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.try_add(move || Ok(factory()))
    }

    /// Register a factory that may fail; a failure aborts that one dispatch
    pub fn try_add<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        self.factories.push((
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Box::new(move || factory().map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)),
        ));
        self
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl ScopeProvider for ScopedServices {
    fn create_scope(&self) -> Result<Scope, DispatchError> {
        let id = self.next_scope_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut scope = Scope::new(id);
        for (type_id, name, factory) in &self.factories {
            let service =
                factory().map_err(|e| DispatchError::Scope(format!("{}: {}", name, e)))?;
            scope.insert_boxed(*type_id, service);
        }
        Ok(scope)
    }
}
