use std::fmt;
use std::sync::{Arc, Mutex};

use crate::constants::ERR_POISONED_LOCK;
use crate::{
    DescriptorPool, Element, ElementName, FactoryError, Handle, Result, SlotKey,
};

/// A name-indexed, reference-counted catalog of elements of one kind.
///
/// This is the machinery every sub-factory is built on. Live elements form a singly-linked
/// list threaded through their descriptors, newest first. Every operation holds the lock for
/// its whole scan-decide-mutate sequence, so operations on one registry are linearizable and
/// nobody ever observes a half-inserted element or two live elements with the same name.
///
/// Cloning the registry creates another handle to the same catalog.
pub(crate) struct Registry<P> {
    inner: Arc<RegistryInner<P>>,
}

pub(crate) struct RegistryInner<P> {
    /// Human-readable element kind for errors and logs, e.g. "semaphore".
    kind: &'static str,

    state: Mutex<RegistryState<P>>,
}

struct RegistryState<P> {
    descriptors: DescriptorPool<Element<P>>,

    /// Descriptor index of the most recently created live element.
    head: Option<usize>,
}

impl<P> RegistryState<P> {
    fn find_index(&self, name: &str) -> Option<usize> {
        let mut cursor = self.head;

        while let Some(index) = cursor {
            let element = self.descriptors.get(index);

            if *element.name() == *name {
                return Some(index);
            }

            cursor = element.next();
        }

        None
    }

    fn unlink(&mut self, index: usize, next: Option<usize>) {
        if self.head == Some(index) {
            self.head = next;
            return;
        }

        let mut cursor = self.head;

        while let Some(current) = cursor {
            let element = self.descriptors.get(current);

            if element.next() == Some(index) {
                element.set_next(next);
                return;
            }

            cursor = element.next();
        }

        panic!("element at descriptor {index} is not linked into its registry");
    }
}

impl<P: Send + Sync> Registry<P> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub(crate) fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                kind,
                state: Mutex::new(RegistryState {
                    descriptors: DescriptorPool::new(capacity),
                    head: None,
                }),
            }),
        }
    }

    /// Creates a new element named `name` with a payload produced by `constructor`.
    ///
    /// The constructor runs while the lock is held and only after the name has been checked
    /// for collisions and a descriptor has been reserved. If it fails, the reservation is
    /// abandoned and its error is returned unchanged.
    pub(crate) fn register_or_create<F>(&self, name: &str, constructor: F) -> Result<Handle<P>>
    where
        F: FnOnce() -> Result<P>,
    {
        let name = ElementName::new(name)?;
        let kind = self.inner.kind;

        let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);

        if state.find_index(&name).is_some() {
            return Err(FactoryError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }

        let head = state.head;

        let Some(inserter) = state.descriptors.begin_insert() else {
            return Err(FactoryError::AllocationFailure {
                kind,
                name: name.to_string(),
                resource: "descriptor pool",
            });
        };

        let payload = constructor()?;

        let key = inserter.key();

        tracing::debug!(kind, name = %name, "element created");

        let element = inserter.insert(Element::new(name, head, payload));
        state.head = Some(key.index());

        Ok(Handle::new(Arc::clone(&self.inner), key, element))
    }

    /// Looks up the live element named `name` and takes a new reference to it.
    pub(crate) fn find(&self, name: &str) -> Result<Handle<P>> {
        let kind = self.inner.kind;

        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);

        let Some(index) = state.find_index(name) else {
            return Err(FactoryError::NotFound {
                kind,
                name: name.to_string(),
            });
        };

        let refs = state.descriptors.get(index).add_ref();

        tracing::trace!(kind, name, refs, "element found");

        Ok(Handle::new(
            Arc::clone(&self.inner),
            state.descriptors.key(index),
            state.descriptors.ptr(index),
        ))
    }

    /// The number of live elements.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.inner.state.lock().expect(ERR_POISONED_LOCK).descriptors.len()
    }

    /// The maximum number of live elements.
    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect(ERR_POISONED_LOCK)
            .descriptors
            .capacity()
    }
}

impl<P> RegistryInner<P> {
    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }

    /// Takes another reference to an element the caller already holds a reference to.
    pub(crate) fn duplicate_reference(&self, key: SlotKey) {
        let state = self.state.lock().expect(ERR_POISONED_LOCK);

        debug_assert!(
            state.descriptors.contains(key),
            "duplicated a {} reference that is not held",
            self.kind
        );

        let element = state.descriptors.get(key.index());
        let refs = element.add_ref();

        tracing::trace!(kind = self.kind, name = %element.name(), refs, "reference duplicated");
    }

    /// Gives up one reference, destroying the element when it was the last one.
    ///
    /// Unlinking the element, dropping its payload and returning its descriptor to the pool
    /// all happen under the same lock acquisition as the final decrement.
    pub(crate) fn release(&self, key: SlotKey) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        debug_assert!(
            state.descriptors.contains(key),
            "released a {} reference that is not held",
            self.kind
        );

        let next = {
            let element = state.descriptors.get(key.index());
            let refs = element.remove_ref();

            if refs > 0 {
                tracing::trace!(
                    kind = self.kind,
                    name = %element.name(),
                    refs,
                    "reference released"
                );
                return;
            }

            tracing::debug!(kind = self.kind, name = %element.name(), "element destroyed");

            element.next()
        };

        state.unlink(key.index(), next);
        state.descriptors.remove(key);
    }
}

impl<P> Clone for Registry<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<P> fmt::Debug for RegistryInner<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("RegistryInner");
        debug.field("kind", &self.kind);

        // Formatting must not deadlock when the caller is the current lock holder.
        match self.state.try_lock() {
            Ok(state) => debug
                .field("descriptors", &state.descriptors)
                .field("head", &state.head)
                .finish(),
            Err(_) => debug.finish_non_exhaustive(),
        }
    }
}
