//! Handler instances supplied by the application.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Handler instances keyed by type.
///
/// Consulted before a registration's default constructor, so handlers
/// that need dependencies can be built by the application and handed over
/// here.
#[derive(Clone, Default)]
pub struct HandlerResolver {
    instances: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl HandlerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance<H: Send + Sync + 'static>(mut self, instance: Arc<H>) -> Self {
        self.insert(instance);
        self
    }

    /// Register `instance`, replacing any previous instance of `H`.
    pub fn insert<H: Send + Sync + 'static>(&mut self, instance: Arc<H>) {
        self.instances.insert(TypeId::of::<H>(), instance);
    }

    pub fn resolve<H: Send + Sync + 'static>(&self) -> Option<Arc<H>> {
        self.get(TypeId::of::<H>())
            .and_then(|instance| instance.downcast::<H>().ok())
    }

    pub fn contains<H: 'static>(&self) -> bool {
        self.instances.contains_key(&TypeId::of::<H>())
    }

    pub(crate) fn get(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.instances.get(&type_id).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
