use crate::constants::DEFAULT_MAX_ELEMENTS;
#[cfg(feature = "heap")]
use crate::Heap;
use crate::{DropPolicy, ObjectsFactory};

/// Builder for creating an instance of [`ObjectsFactory`].
///
/// You only need to use this builder if you want to customize the factory configuration.
/// The default configuration used by [`ObjectsFactory::new()`][1] gives every sub-registry
/// room for 32 live elements and backs dynamic storage with an unbounded heap.
///
/// # Examples
///
/// ```
/// use objects_factory::{Heap, ObjectsFactory};
///
/// let factory = ObjectsFactory::builder()
///     .max_buffers(4)
///     .heap(Heap::with_limit(1024))
///     .build();
///
/// assert_eq!(factory.buffer_capacity(), 4);
/// ```
///
/// [1]: ObjectsFactory::new
#[derive(Debug)]
#[must_use]
pub struct ObjectsFactoryBuilder {
    #[cfg(feature = "objects_registry")]
    pub(crate) max_objects: usize,

    #[cfg(feature = "generic_buffers")]
    pub(crate) max_buffers: usize,

    #[cfg(feature = "semaphores")]
    pub(crate) max_semaphores: usize,

    #[cfg(feature = "mailboxes")]
    pub(crate) max_mailboxes: usize,

    #[cfg(feature = "heap")]
    pub(crate) heap: Option<Heap>,

    pub(crate) drop_policy: DropPolicy,
}

impl ObjectsFactoryBuilder {
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(feature = "objects_registry")]
            max_objects: DEFAULT_MAX_ELEMENTS,
            #[cfg(feature = "generic_buffers")]
            max_buffers: DEFAULT_MAX_ELEMENTS,
            #[cfg(feature = "semaphores")]
            max_semaphores: DEFAULT_MAX_ELEMENTS,
            #[cfg(feature = "mailboxes")]
            max_mailboxes: DEFAULT_MAX_ELEMENTS,
            #[cfg(feature = "heap")]
            heap: None,
            drop_policy: DropPolicy::default(),
        }
    }

    /// Sets the maximum number of simultaneously registered objects.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    #[cfg(feature = "objects_registry")]
    pub fn max_objects(mut self, max: usize) -> Self {
        assert!(max > 0, "max_objects must be non-zero");

        self.max_objects = max;
        self
    }

    /// Sets the maximum number of simultaneously live buffers.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    #[cfg(feature = "generic_buffers")]
    pub fn max_buffers(mut self, max: usize) -> Self {
        assert!(max > 0, "max_buffers must be non-zero");

        self.max_buffers = max;
        self
    }

    /// Sets the maximum number of simultaneously live semaphores.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    #[cfg(feature = "semaphores")]
    pub fn max_semaphores(mut self, max: usize) -> Self {
        assert!(max > 0, "max_semaphores must be non-zero");

        self.max_semaphores = max;
        self
    }

    /// Sets the maximum number of simultaneously live mailboxes.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    #[cfg(feature = "mailboxes")]
    pub fn max_mailboxes(mut self, max: usize) -> Self {
        assert!(max > 0, "max_mailboxes must be non-zero");

        self.max_mailboxes = max;
        self
    }

    /// Sets the heap that buffers and mailboxes allocate their storage from.
    ///
    /// The heap may be shared with other factories or other users by cloning it first.
    #[cfg(feature = "heap")]
    pub fn heap(mut self, heap: Heap) -> Self {
        self.heap = Some(heap);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the factory. This governs how to treat
    /// elements that are still live when the last clone of the factory is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use objects_factory::{DropPolicy, ObjectsFactory};
    ///
    /// let factory = ObjectsFactory::builder()
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    /// # drop(factory);
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the factory with the specified configuration.
    #[must_use]
    pub fn build(self) -> ObjectsFactory {
        ObjectsFactory::new_inner(self)
    }
}
