use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ElementName;

const NO_NEXT: usize = usize::MAX;

/// The header every factory-managed object carries in front of its kind-specific payload.
///
/// `refs` and `next` are only changed while the owning registry's lock is held, which is what
/// orders those changes. They are atomic so that handle holders can read a snapshot of the
/// reference count without taking the lock, hence `Relaxed` everywhere.
#[derive(Debug)]
pub(crate) struct Element<P> {
    name: ElementName,

    refs: AtomicUsize,

    /// Descriptor index of the next element in the sub-registry's list, `NO_NEXT` at the tail.
    next: AtomicUsize,

    payload: P,
}

impl<P> Element<P> {
    /// Creates an element holding the creator's reference.
    pub(crate) fn new(name: ElementName, next: Option<usize>, payload: P) -> Self {
        Self {
            name,
            refs: AtomicUsize::new(1),
            next: AtomicUsize::new(next.unwrap_or(NO_NEXT)),
            payload,
        }
    }

    pub(crate) fn name(&self) -> &ElementName {
        &self.name
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(Ordering::Relaxed)
    }

    pub(crate) fn payload(&self) -> &P {
        &self.payload
    }

    pub(crate) fn next(&self) -> Option<usize> {
        match self.next.load(Ordering::Relaxed) {
            NO_NEXT => None,
            index => Some(index),
        }
    }

    /// Registry lock must be held.
    pub(crate) fn set_next(&self, next: Option<usize>) {
        self.next.store(next.unwrap_or(NO_NEXT), Ordering::Relaxed);
    }

    /// Registry lock must be held. Returns the new count.
    pub(crate) fn add_ref(&self) -> usize {
        let refs = self
            .refs()
            .checked_add(1)
            .expect("reference count overflow is not a realistic possibility");

        self.refs.store(refs, Ordering::Relaxed);
        refs
    }

    /// Registry lock must be held. Returns the new count; the caller destroys the element
    /// when it reaches zero.
    pub(crate) fn remove_ref(&self) -> usize {
        let refs = self.refs();

        debug_assert!(
            refs > 0,
            "released element '{}' more times than it was referenced",
            self.name
        );

        let refs = refs.saturating_sub(1);
        self.refs.store(refs, Ordering::Relaxed);
        refs
    }
}
