use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use crate::constants::ERR_POISONED_LOCK;
use crate::{FactoryError, Handle, Heap, HeapBlock, Registry, Result};

const KIND: &str = "buffer";

/// A held reference to a dynamic buffer.
pub type DynamicBuffer = Handle<BufferStorage>;

/// The payload of a dynamic buffer: a fixed-size, zero-initialized byte region owned by the
/// factory and allocated from its heap.
///
/// The bytes are shared by every holder of the buffer, so access goes through
/// [`lock()`][Self::lock].
pub struct BufferStorage {
    bytes: Mutex<HeapBlock>,
    len: usize,
}

impl BufferStorage {
    /// The size of the buffer in bytes, fixed at creation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer was created with a size of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Acquires exclusive access to the bytes, blocking while another holder has it.
    pub fn lock(&self) -> BufferGuard<'_> {
        BufferGuard {
            block: self.bytes.lock().expect(ERR_POISONED_LOCK),
        }
    }
}

impl fmt::Debug for BufferStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferStorage")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the bytes of a [`BufferStorage`]. Dereferences to `[u8]`.
pub struct BufferGuard<'a> {
    block: MutexGuard<'a, HeapBlock>,
}

impl Deref for BufferGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.block
    }
}

impl DerefMut for BufferGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.block
    }
}

impl fmt::Debug for BufferGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferGuard")
            .field("len", &self.block.len())
            .finish_non_exhaustive()
    }
}

/// Creates named byte buffers backed by the heap.
#[derive(Clone, Debug)]
pub(crate) struct DynamicBuffers {
    registry: Registry<BufferStorage>,
    heap: Heap,
}

impl DynamicBuffers {
    pub(crate) fn new(capacity: usize, heap: Heap) -> Self {
        Self {
            registry: Registry::new(KIND, capacity),
            heap,
        }
    }

    pub(crate) fn create(&self, name: &str, size: usize) -> Result<DynamicBuffer> {
        self.registry.register_or_create(name, || {
            let block = self
                .heap
                .allocate(size)
                .ok_or_else(|| FactoryError::AllocationFailure {
                    kind: KIND,
                    name: name.to_string(),
                    resource: "heap",
                })?;

            Ok(BufferStorage {
                bytes: Mutex::new(block),
                len: size,
            })
        })
    }

    pub(crate) fn find(&self, name: &str) -> Result<DynamicBuffer> {
        self.registry.find(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.registry.capacity()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(BufferStorage: Send, Sync, fmt::Debug);
    assert_impl_all!(DynamicBuffer: Send, Sync);

    fn buffers(heap: Heap) -> DynamicBuffers {
        DynamicBuffers::new(4, heap)
    }

    #[test]
    fn created_buffer_is_zeroed_and_writable() {
        let buffers = buffers(Heap::unbounded());

        let buffer = buffers.create("mybuf", 128).unwrap();
        assert_eq!(buffer.len(), 128);
        assert!(!buffer.is_empty());
        assert!(buffer.lock().iter().all(|byte| *byte == 0));

        buffer.lock()[5] = 42;

        let found = buffers.find("mybuf").unwrap();
        assert_eq!(found.lock()[5], 42);
    }

    #[test]
    fn heap_bytes_return_at_last_release() {
        let heap = Heap::with_limit(100);
        let buffers = buffers(heap.clone());

        let buffer = buffers.create("a", 60).unwrap();
        let found = buffers.find("a").unwrap();
        assert_eq!(heap.used(), 60);

        buffer.release();
        assert_eq!(heap.used(), 60);

        found.release();
        assert_eq!(heap.used(), 0);
        assert_eq!(buffers.len(), 0);
    }

    #[test]
    fn heap_exhaustion_registers_nothing() {
        let heap = Heap::with_limit(100);
        let buffers = buffers(heap.clone());

        let _a = buffers.create("a", 80).unwrap();

        let result = buffers.create("b", 80);

        assert!(matches!(
            result,
            Err(FactoryError::AllocationFailure {
                kind: "buffer",
                resource: "heap",
                ..
            })
        ));
        assert!(buffers.find("b").is_err());
        assert_eq!(buffers.len(), 1);
        assert_eq!(heap.used(), 80);
    }

    #[test]
    fn duplicate_name_consumes_no_heap() {
        let heap = Heap::with_limit(100);
        let buffers = buffers(heap.clone());

        let _a = buffers.create("a", 50).unwrap();

        assert!(matches!(
            buffers.create("a", 50),
            Err(FactoryError::DuplicateName { .. })
        ));
        assert_eq!(heap.used(), 50);
    }

    #[test]
    fn zero_sized_buffer_is_allowed() {
        let buffers = buffers(Heap::unbounded());

        let buffer = buffers.create("empty", 0).unwrap();

        assert!(buffer.is_empty());
        assert!(buffer.lock().is_empty());
        assert_eq!(buffers.capacity(), 4);
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        const THREADS: u8 = 4;

        let buffers = buffers(Heap::unbounded());
        let buffer = buffers.create("shared", 1).unwrap();

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let handle = buffers.find("shared").unwrap();

                    for _ in 0..50 {
                        let mut bytes = handle.lock();
                        bytes[0] = bytes[0].wrapping_add(1);
                    }
                });
            }
        });

        assert_eq!(buffer.lock()[0], THREADS * 50);
        assert_eq!(buffer.refs(), 1);
    }
}
