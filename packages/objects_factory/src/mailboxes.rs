use crate::{FactoryError, Handle, Heap, Mailbox, Registry, Result};

const KIND: &str = "mailbox";

/// A held reference to a dynamic mailbox.
pub type DynamicMailbox = Handle<Mailbox>;

/// Creates named mailboxes whose message slots are charged against the heap.
#[derive(Clone, Debug)]
pub(crate) struct DynamicMailboxes {
    registry: Registry<Mailbox>,
    heap: Heap,
}

impl DynamicMailboxes {
    pub(crate) fn new(capacity: usize, heap: Heap) -> Self {
        Self {
            registry: Registry::new(KIND, capacity),
            heap,
        }
    }

    pub(crate) fn create(&self, name: &str, capacity: usize) -> Result<DynamicMailbox> {
        if capacity == 0 {
            return Err(FactoryError::InvalidArgument {
                problem: format!("{KIND} '{name}' must have room for at least one message"),
            });
        }

        self.registry.register_or_create(name, || {
            Mailbox::from_heap(&self.heap, capacity).ok_or_else(|| {
                FactoryError::AllocationFailure {
                    kind: KIND,
                    name: name.to_string(),
                    resource: "heap",
                }
            })
        })
    }

    pub(crate) fn find(&self, name: &str) -> Result<DynamicMailbox> {
        self.registry.find(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.registry.capacity()
    }
}
