#[cfg(feature = "objects_registry")]
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread;

#[cfg(feature = "generic_buffers")]
use crate::{DynamicBuffer, DynamicBuffers};
#[cfg(feature = "mailboxes")]
use crate::{DynamicMailbox, DynamicMailboxes};
#[cfg(feature = "semaphores")]
use crate::{DynamicSemaphore, DynamicSemaphores};
use crate::{DropPolicy, FactoryError, Handle, ObjectsFactoryBuilder};
#[cfg(feature = "heap")]
use crate::Heap;
#[cfg(feature = "objects_registry")]
use crate::{ObjectsRegistry, RegisteredObject};

/// A catalog of named, reference-counted kernel objects.
///
/// Each kind of object lives in its own sub-registry with its own lock and its own
/// fixed-capacity descriptor pool, so operations on different kinds never contend. Within one
/// sub-registry, names are unique among live elements and every operation is linearizable.
///
/// Which sub-registries exist is selected at compile time through Cargo features:
///
/// * `objects_registry` - [`register_object()`][Self::register_object] publishes a value the
///   caller keeps ownership of.
/// * `generic_buffers` - [`create_buffer()`][Self::create_buffer] allocates a byte buffer
///   from the heap.
/// * `semaphores` - [`create_semaphore()`][Self::create_semaphore] creates a counting
///   semaphore.
/// * `mailboxes` - [`create_mailbox()`][Self::create_mailbox] creates a bounded message queue
///   whose slots come from the heap.
///
/// Every create, register or find returns a [`Handle`] that holds one reference. The element
/// is destroyed when its last handle is released.
///
/// The factory is cheap to clone. All clones share the same sub-registries.
///
/// # Example
///
/// ```rust
/// use objects_factory::{FactoryError, ObjectsFactory};
///
/// let factory = ObjectsFactory::new();
///
/// let buffer = factory.create_buffer("mybuf", 128)?;
/// buffer.lock()[0] = 0xAA;
///
/// // Another task looks the buffer up by name and sees the same bytes.
/// let found = factory.find_buffer("mybuf")?;
/// assert_eq!(found.lock()[0], 0xAA);
/// assert_eq!(found.refs(), 2);
///
/// factory.release(found);
/// factory.release(buffer);
///
/// assert!(matches!(
///     factory.find_buffer("mybuf"),
///     Err(FactoryError::NotFound { .. })
/// ));
/// # Ok::<(), FactoryError>(())
/// ```
#[derive(Clone)]
pub struct ObjectsFactory {
    inner: Arc<FactoryInner>,
}

struct FactoryInner {
    #[cfg(feature = "objects_registry")]
    objects: ObjectsRegistry,

    #[cfg(feature = "generic_buffers")]
    buffers: DynamicBuffers,

    #[cfg(feature = "semaphores")]
    semaphores: DynamicSemaphores,

    #[cfg(feature = "mailboxes")]
    mailboxes: DynamicMailboxes,

    #[cfg(feature = "heap")]
    heap: Heap,

    drop_policy: DropPolicy,
}

impl ObjectsFactory {
    /// Creates a factory with the default configuration.
    ///
    /// Use [`builder()`][Self::builder] to customize capacities, the heap or the drop policy.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a factory with a custom configuration.
    pub fn builder() -> ObjectsFactoryBuilder {
        ObjectsFactoryBuilder::new()
    }

    pub(crate) fn new_inner(builder: ObjectsFactoryBuilder) -> Self {
        let drop_policy = builder.drop_policy;

        #[cfg(feature = "heap")]
        let heap = builder.heap.unwrap_or_default();

        tracing::debug!(?drop_policy, "objects factory created");

        Self {
            inner: Arc::new(FactoryInner {
                #[cfg(feature = "objects_registry")]
                objects: ObjectsRegistry::new(builder.max_objects),
                #[cfg(feature = "generic_buffers")]
                buffers: DynamicBuffers::new(builder.max_buffers, heap.clone()),
                #[cfg(feature = "semaphores")]
                semaphores: DynamicSemaphores::new(builder.max_semaphores),
                #[cfg(feature = "mailboxes")]
                mailboxes: DynamicMailboxes::new(builder.max_mailboxes, heap.clone()),
                #[cfg(feature = "heap")]
                heap,
                drop_policy,
            }),
        }
    }

    /// Publishes `target` under `name` without taking ownership of it.
    ///
    /// The factory keeps only a weak reference. Other tasks can [find][Self::find_object] the
    /// registration and [`get()`][crate::ObjectRef::get] the value for as long as the caller
    /// keeps it alive.
    ///
    /// # Errors
    ///
    /// * [`FactoryError::DuplicateName`] if a live object with this name is registered.
    /// * [`FactoryError::AllocationFailure`] if the object descriptor pool is full.
    /// * [`FactoryError::InvalidName`] if the name is empty or too long.
    #[cfg(feature = "objects_registry")]
    pub fn register_object<T>(
        &self,
        name: &str,
        target: &Arc<T>,
    ) -> Result<RegisteredObject, FactoryError>
    where
        T: Any + Send + Sync,
    {
        self.inner.objects.register(name, target)
    }

    /// Looks up a registered object by name, taking a new reference to it.
    ///
    /// # Errors
    ///
    /// [`FactoryError::NotFound`] if no live object with this name is registered.
    #[cfg(feature = "objects_registry")]
    pub fn find_object(&self, name: &str) -> Result<RegisteredObject, FactoryError> {
        self.inner.objects.find(name)
    }

    /// The number of live registered objects.
    #[cfg(feature = "objects_registry")]
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.inner.objects.len()
    }

    /// The maximum number of live registered objects.
    #[cfg(feature = "objects_registry")]
    #[must_use]
    pub fn object_capacity(&self) -> usize {
        self.inner.objects.capacity()
    }

    /// Creates a zero-initialized byte buffer of `size` bytes, allocated from the heap.
    ///
    /// # Errors
    ///
    /// * [`FactoryError::DuplicateName`] if a live buffer with this name exists.
    /// * [`FactoryError::AllocationFailure`] if the buffer descriptor pool is full or the heap
    ///   cannot supply `size` bytes. Nothing is registered in either case.
    /// * [`FactoryError::InvalidName`] if the name is empty or too long.
    #[cfg(feature = "generic_buffers")]
    pub fn create_buffer(&self, name: &str, size: usize) -> Result<DynamicBuffer, FactoryError> {
        self.inner.buffers.create(name, size)
    }

    /// Looks up a buffer by name, taking a new reference to it.
    ///
    /// # Errors
    ///
    /// [`FactoryError::NotFound`] if no live buffer with this name exists.
    #[cfg(feature = "generic_buffers")]
    pub fn find_buffer(&self, name: &str) -> Result<DynamicBuffer, FactoryError> {
        self.inner.buffers.find(name)
    }

    /// The number of live buffers.
    #[cfg(feature = "generic_buffers")]
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.inner.buffers.len()
    }

    /// The maximum number of live buffers.
    #[cfg(feature = "generic_buffers")]
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffers.capacity()
    }

    /// Creates a counting semaphore with the given initial count, which may be negative.
    ///
    /// # Errors
    ///
    /// * [`FactoryError::DuplicateName`] if a live semaphore with this name exists.
    /// * [`FactoryError::AllocationFailure`] if the semaphore descriptor pool is full.
    /// * [`FactoryError::InvalidName`] if the name is empty or too long.
    #[cfg(feature = "semaphores")]
    pub fn create_semaphore(
        &self,
        name: &str,
        initial_count: isize,
    ) -> Result<DynamicSemaphore, FactoryError> {
        self.inner.semaphores.create(name, initial_count)
    }

    /// Looks up a semaphore by name, taking a new reference to it.
    ///
    /// # Errors
    ///
    /// [`FactoryError::NotFound`] if no live semaphore with this name exists.
    #[cfg(feature = "semaphores")]
    pub fn find_semaphore(&self, name: &str) -> Result<DynamicSemaphore, FactoryError> {
        self.inner.semaphores.find(name)
    }

    /// The number of live semaphores.
    #[cfg(feature = "semaphores")]
    #[must_use]
    pub fn semaphore_count(&self) -> usize {
        self.inner.semaphores.len()
    }

    /// The maximum number of live semaphores.
    #[cfg(feature = "semaphores")]
    #[must_use]
    pub fn semaphore_capacity(&self) -> usize {
        self.inner.semaphores.capacity()
    }

    /// Creates a mailbox with room for `capacity` messages, charging its slots to the heap.
    ///
    /// # Errors
    ///
    /// * [`FactoryError::InvalidArgument`] if `capacity` is zero.
    /// * [`FactoryError::DuplicateName`] if a live mailbox with this name exists.
    /// * [`FactoryError::AllocationFailure`] if the mailbox descriptor pool is full or the heap
    ///   cannot supply the slots.
    /// * [`FactoryError::InvalidName`] if the name is empty or too long.
    #[cfg(feature = "mailboxes")]
    pub fn create_mailbox(
        &self,
        name: &str,
        capacity: usize,
    ) -> Result<DynamicMailbox, FactoryError> {
        self.inner.mailboxes.create(name, capacity)
    }

    /// Looks up a mailbox by name, taking a new reference to it.
    ///
    /// # Errors
    ///
    /// [`FactoryError::NotFound`] if no live mailbox with this name exists.
    #[cfg(feature = "mailboxes")]
    pub fn find_mailbox(&self, name: &str) -> Result<DynamicMailbox, FactoryError> {
        self.inner.mailboxes.find(name)
    }

    /// The number of live mailboxes.
    #[cfg(feature = "mailboxes")]
    #[must_use]
    pub fn mailbox_count(&self) -> usize {
        self.inner.mailboxes.len()
    }

    /// The maximum number of live mailboxes.
    #[cfg(feature = "mailboxes")]
    #[must_use]
    pub fn mailbox_capacity(&self) -> usize {
        self.inner.mailboxes.capacity()
    }

    /// The heap that buffers and mailboxes allocate from.
    #[cfg(feature = "heap")]
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.inner.heap
    }

    /// Takes another reference to an element the caller already holds.
    ///
    /// Equivalent to cloning the handle.
    #[must_use]
    pub fn duplicate_reference<P>(&self, handle: &Handle<P>) -> Handle<P> {
        handle.duplicate()
    }

    /// Gives up a held reference, destroying the element if it was the last one.
    ///
    /// Equivalent to dropping the handle.
    pub fn release<P>(&self, handle: Handle<P>) {
        handle.release();
    }
}

impl Default for ObjectsFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryInner {
    fn live_elements(&self) -> usize {
        let mut live = 0;

        #[cfg(feature = "objects_registry")]
        {
            live += self.objects.len();
        }

        #[cfg(feature = "generic_buffers")]
        {
            live += self.buffers.len();
        }

        #[cfg(feature = "semaphores")]
        {
            live += self.semaphores.len();
        }

        #[cfg(feature = "mailboxes")]
        {
            live += self.mailboxes.len();
        }

        live
    }
}

impl Drop for FactoryInner {
    fn drop(&mut self) {
        let live = self.live_elements();

        if live == 0 {
            tracing::debug!("objects factory dropped");
            return;
        }

        // Handles keep their sub-registry alive, so these elements stay valid until released.
        tracing::debug!(live, "objects factory dropped with live elements");

        // If we are already panicking, a second panic would only obscure the first one.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            panic!(
                "dropped an objects factory with {live} live elements with a policy that says it must be empty when dropped"
            );
        }
    }
}

impl fmt::Debug for ObjectsFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &*self.inner;
        let mut debug = f.debug_struct("ObjectsFactory");

        #[cfg(feature = "objects_registry")]
        debug.field("objects", &inner.objects);
        #[cfg(feature = "generic_buffers")]
        debug.field("buffers", &inner.buffers);
        #[cfg(feature = "semaphores")]
        debug.field("semaphores", &inner.semaphores);
        #[cfg(feature = "mailboxes")]
        debug.field("mailboxes", &inner.mailboxes);
        #[cfg(feature = "heap")]
        debug.field("heap", &inner.heap);

        debug.field("drop_policy", &inner.drop_policy).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(ObjectsFactory: Send, Sync, Clone, Default, fmt::Debug);

    #[test]
    #[cfg(feature = "semaphores")]
    fn clones_share_sub_registries() {
        let factory = ObjectsFactory::new();
        let clone = factory.clone();

        let sem = factory.create_semaphore("s", 1).unwrap();
        let found = clone.find_semaphore("s").unwrap();

        assert!(found.ptr_eq(&sem));
        assert_eq!(clone.semaphore_count(), 1);
    }

    #[test]
    #[cfg(feature = "semaphores")]
    fn duplicate_and_release_adjust_refs() {
        let factory = ObjectsFactory::new();
        let sem = factory.create_semaphore("s", 0).unwrap();

        let duplicate = factory.duplicate_reference(&sem);
        assert!(duplicate.ptr_eq(&sem));
        assert_eq!(sem.refs(), 2);

        factory.release(duplicate);
        assert_eq!(sem.refs(), 1);

        factory.release(sem);
        assert_eq!(factory.semaphore_count(), 0);
    }

    #[test]
    #[cfg(all(feature = "semaphores", feature = "generic_buffers"))]
    fn sub_registries_have_separate_namespaces() {
        let factory = ObjectsFactory::new();

        let _sem = factory.create_semaphore("same", 0).unwrap();
        let _buf = factory.create_buffer("same", 8).unwrap();

        assert_eq!(factory.semaphore_count(), 1);
        assert_eq!(factory.buffer_count(), 1);
    }

    #[test]
    #[cfg(feature = "semaphores")]
    fn handles_outlive_factory() {
        let factory = ObjectsFactory::new();
        let sem = factory.create_semaphore("s", 2).unwrap();

        drop(factory);

        sem.wait().unwrap();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    #[cfg(feature = "semaphores")]
    #[should_panic]
    fn drop_with_live_elements_and_forbidden_policy_is_panic() {
        let factory = ObjectsFactory::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        let sem = factory.create_semaphore("s", 0).unwrap();

        drop(factory);

        // Not reached, but keeps the handle alive past the factory drop.
        drop(sem);
    }

    #[test]
    fn drop_empty_with_forbidden_policy_ok() {
        drop(
            ObjectsFactory::builder()
                .drop_policy(DropPolicy::MustNotDropItems)
                .build(),
        );
    }

    #[test]
    fn debug_lists_configuration() {
        let factory = ObjectsFactory::new();

        let output = format!("{factory:?}");

        assert!(output.contains("ObjectsFactory"));
        assert!(output.contains("MayDropItems"));
    }
}
