use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::{Element, RegistryInner, SlotKey};

/// One held reference to a live factory element.
///
/// Every handle accounts for exactly one unit of the element's reference count:
///
/// * Creating, registering or finding an element returns a new handle.
/// * Cloning a handle (or calling [`duplicate()`][Self::duplicate]) takes another reference
///   to the same element.
/// * Dropping a handle (or calling [`release()`][Self::release]) gives its reference back.
///   Releasing the last reference unlinks the element from its sub-registry and destroys its
///   payload, after which the name can be used again.
///
/// Because releasing consumes the handle, a reference cannot be released twice.
///
/// The payload is reachable through [`Deref`]. Handles can be sent to and shared with other
/// threads when the payload allows it.
///
/// # Example
///
/// ```rust
/// use objects_factory::ObjectsFactory;
///
/// let factory = ObjectsFactory::new();
///
/// let sem = factory.create_semaphore("mysem", 0)?;
/// let found = factory.find_semaphore("mysem")?;
///
/// assert!(found.ptr_eq(&sem));
/// assert_eq!(sem.refs(), 2);
///
/// found.release();
/// assert_eq!(sem.refs(), 1);
/// # Ok::<(), objects_factory::FactoryError>(())
/// ```
pub struct Handle<P> {
    registry: Arc<RegistryInner<P>>,

    key: SlotKey,

    /// Valid for as long as this handle exists, because the element cannot be destroyed
    /// while we hold a reference to it and its descriptor never moves.
    element: NonNull<Element<P>>,
}

impl<P> Handle<P> {
    pub(crate) fn new(
        registry: Arc<RegistryInner<P>>,
        key: SlotKey,
        element: NonNull<Element<P>>,
    ) -> Self {
        Self {
            registry,
            key,
            element,
        }
    }

    fn element(&self) -> &Element<P> {
        // SAFETY: We hold a reference, so the element stays live in its pinned descriptor and
        // is only ever accessed through shared references until the last reference is gone.
        unsafe { self.element.as_ref() }
    }

    #[cfg(test)]
    pub(crate) fn key(&self) -> SlotKey {
        self.key
    }

    /// The name the element was created or registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        self.element().name().as_str()
    }

    /// The kind of element this handle refers to, e.g. "buffer".
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.registry.kind()
    }

    /// The number of references currently held to the element, including this one.
    ///
    /// This is a snapshot. Other threads holding references to the same element may change it
    /// at any time.
    #[must_use]
    pub fn refs(&self) -> usize {
        self.element().refs()
    }

    /// Takes another reference to the same element. Equivalent to [`Clone::clone()`].
    #[must_use]
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Gives up this reference. Equivalent to dropping the handle.
    ///
    /// If this was the last reference, the element is destroyed before this returns.
    pub fn release(self) {
        drop(self);
    }

    /// Whether both handles refer to the same element.
    ///
    /// An element created under a name that previously belonged to a destroyed element is a
    /// different element, even though it may occupy the same descriptor.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry) && self.key == other.key
    }
}

impl<P> Clone for Handle<P> {
    fn clone(&self) -> Self {
        self.registry.duplicate_reference(self.key);

        Self {
            registry: Arc::clone(&self.registry),
            key: self.key,
            element: self.element,
        }
    }
}

impl<P> Drop for Handle<P> {
    fn drop(&mut self) {
        self.registry.release(self.key);
    }
}

impl<P> Deref for Handle<P> {
    type Target = P;

    fn deref(&self) -> &Self::Target {
        self.element().payload()
    }
}

impl<P> PartialEq for Handle<P> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<P> Eq for Handle<P> {}

impl<P: fmt::Debug> fmt::Debug for Handle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("refs", &self.refs())
            .field("payload", &**self)
            .finish_non_exhaustive()
    }
}

// SAFETY: The element is only reached through shared references and the registry lock, so a
// handle may move to another thread as long as the payload can be shared and dropped there.
unsafe impl<P: Send + Sync> Send for Handle<P> {}

// SAFETY: Shared access to a handle only hands out `&P` and takes or returns references under
// the registry lock, which is fine across threads when the payload can be shared and dropped.
unsafe impl<P: Send + Sync> Sync for Handle<P> {}
