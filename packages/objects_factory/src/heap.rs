use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The general-purpose memory source for factory objects that own variable-sized storage.
///
/// A heap may be limited to a byte budget, which makes allocation failure a predictable,
/// testable condition. Independent of the budget, allocation is fallible: if the system
/// allocator refuses a request, the heap reports failure instead of aborting.
///
/// Cloning a heap creates another handle to the same budget.
///
/// # Example
///
/// ```rust
/// use objects_factory::Heap;
///
/// let heap = Heap::with_limit(256);
///
/// let block = heap.allocate(200).unwrap();
/// assert_eq!(heap.used(), 200);
///
/// // Over budget.
/// assert!(heap.allocate(100).is_none());
///
/// drop(block);
/// assert_eq!(heap.used(), 0);
/// ```
#[derive(Clone)]
pub struct Heap {
    inner: Arc<HeapInner>,
}

struct HeapInner {
    limit: Option<usize>,
    used: AtomicUsize,
}

impl Heap {
    /// Creates a heap limited only by the system allocator.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Creates a heap that hands out at most `limit` bytes at any one time.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self::new(Some(limit))
    }

    fn new(limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(HeapInner {
                limit,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// The byte budget, if any.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.inner.limit
    }

    /// Bytes currently handed out.
    #[must_use]
    pub fn used(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }

    /// Bytes that can still be handed out, or `None` for an unbounded heap.
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.inner
            .limit
            .map(|limit| limit.saturating_sub(self.used()))
    }

    /// Allocates a zero-initialized block of `size` bytes.
    ///
    /// Returns `None` if the request does not fit in the budget or the system allocator
    /// cannot satisfy it. The bytes return to the heap when the block is dropped.
    #[must_use]
    pub fn allocate(&self, size: usize) -> Option<HeapBlock> {
        let lease = self.lease(size)?;

        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size).ok()?;
        bytes.resize(size, 0);

        Some(HeapBlock {
            bytes: bytes.into_boxed_slice(),
            _lease: lease,
        })
    }

    /// Charges `size` bytes against the budget without allocating them, for callers that
    /// allocate their storage in some other shape.
    #[must_use]
    pub(crate) fn lease(&self, size: usize) -> Option<HeapLease> {
        self.inner
            .used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                let new_used = used.checked_add(size)?;

                match self.inner.limit {
                    Some(limit) if new_used > limit => None,
                    _ => Some(new_used),
                }
            })
            .ok()?;

        Some(HeapLease {
            heap: Arc::clone(&self.inner),
            size,
        })
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("limit", &self.limit())
            .field("used", &self.used())
            .finish()
    }
}

/// A budget charge that is returned to its heap exactly once, when dropped.
pub(crate) struct HeapLease {
    heap: Arc<HeapInner>,
    size: usize,
}

impl HeapLease {
    #[must_use]
    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

impl Drop for HeapLease {
    fn drop(&mut self) {
        self.heap.used.fetch_sub(self.size, Ordering::Relaxed);
    }
}

impl fmt::Debug for HeapLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapLease")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A block of bytes allocated from a [`Heap`].
///
/// Dereferences to `[u8]`. Dropping the block returns its bytes to the heap.
pub struct HeapBlock {
    bytes: Box<[u8]>,
    _lease: HeapLease,
}

impl Deref for HeapBlock {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl DerefMut for HeapBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes
    }
}

impl fmt::Debug for HeapBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapBlock")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
