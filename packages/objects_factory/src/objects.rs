use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::{Handle, Registry, Result};

const KIND: &str = "object";

/// A held reference to a registered object.
pub type RegisteredObject = Handle<ObjectRef>;

/// The payload of a registered object: a non-owning reference to a value published by its
/// owner.
///
/// The factory never keeps the value alive. Once the publisher drops its last `Arc`, the
/// registration remains (it is released like any other element) but
/// [`get()`][Self::get] returns `None`.
pub struct ObjectRef {
    target: Weak<dyn Any + Send + Sync>,
}

impl ObjectRef {
    /// Returns the published value if it is still alive and of type `T`.
    #[must_use]
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.target.upgrade()?.downcast::<T>().ok()
    }

    /// Whether the publisher still holds the value.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("is_alive", &self.is_alive())
            .finish()
    }
}

/// Publishes caller-owned values under names.
#[derive(Clone, Debug)]
pub(crate) struct ObjectsRegistry {
    registry: Registry<ObjectRef>,
}

impl ObjectsRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            registry: Registry::new(KIND, capacity),
        }
    }

    pub(crate) fn register<T>(&self, name: &str, target: &Arc<T>) -> Result<RegisteredObject>
    where
        T: Any + Send + Sync,
    {
        let target: Weak<dyn Any + Send + Sync> = Arc::<T>::downgrade(target);

        self.registry
            .register_or_create(name, || Ok(ObjectRef { target }))
    }

    pub(crate) fn find(&self, name: &str) -> Result<RegisteredObject> {
        self.registry.find(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.registry.capacity()
    }
}
