use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::any::type_name;
use std::ptr::NonNull;
use std::{fmt, mem};


/// Identifies one occupancy of one descriptor slot.
///
/// The generation is bumped whenever the slot is vacated, so a key that outlives its element
/// no longer matches the slot even after the slot is reused by a new element.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct SlotKey {
    index: usize,
    generation: u32,
}

impl SlotKey {
    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.index
    }
}

/// Fixed-capacity storage for element descriptors, the bound on how many elements a
/// sub-registry can hold at the same time.
///
/// Slots live in a single heap allocation made when the pool is created and never move, so
/// a pointer to an occupied slot stays valid until that slot is vacated. The pool does not
/// keep references to its items and only creates a reference to a slot when asked to, which
/// makes it valid for callers to read items through such pointers without holding an
/// exclusive reference to the pool, as long as nobody concurrently removes the same item.
///
/// Free slots form an intrusive stack: each vacant slot stores the index of the next free
/// slot, and `next_free_index` points at the top. It points out of bounds when the pool is
/// full.
pub(crate) struct DescriptorPool<T> {
    first_entry_ptr: NonNull<Entry<T>>,

    capacity: usize,

    next_free_index: usize,

    /// The number of occupied slots.
    count: usize,
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    slot: Slot<T>,
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { value: T },

    Vacant { next_free_index: usize },
}

impl<T> DescriptorPool<T> {
    /// Creates a pool with room for `capacity` descriptors.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "DescriptorPool must have non-zero capacity");
        assert!(
            capacity < usize::MAX,
            "DescriptorPool capacity must be less than usize::MAX"
        );

        let layout = Self::layout(capacity);

        // SAFETY: The layout is valid for the target type and not zero-sized because
        // every entry carries a generation and capacity is non-zero.
        let Some(ptr) = NonNull::new(unsafe { alloc(layout) }.cast::<Entry<T>>()) else {
            handle_alloc_error(layout);
        };

        for index in 0..capacity {
            // SAFETY: The allocation has room for `capacity` entries.
            let entry = unsafe { ptr.add(index) };

            // SAFETY: The pointer is valid for writes and of the right type.
            unsafe {
                entry.as_ptr().write(Entry {
                    generation: 0,
                    slot: Slot::Vacant {
                        // For the last slot this points out of bounds, meaning "full".
                        next_free_index: index
                            .checked_add(1)
                            .expect("guarded by capacity < usize::MAX above"),
                    },
                });
            }
        }

        Self {
            first_entry_ptr: ptr,
            capacity,
            next_free_index: 0,
            count: 0,
        }
    }

    fn layout(capacity: usize) -> Layout {
        Layout::array::<Entry<T>>(capacity).expect("simple flat array layout must be calculable")
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.next_free_index >= self.capacity
    }

    fn entry(&self, index: usize) -> &Entry<T> {
        // SAFETY: Every entry is initialized in the ctor and `entry_ptr()` checks bounds.
        unsafe { self.entry_ptr(index).as_ref() }
    }

    #[expect(clippy::needless_pass_by_ref_mut, reason = "false positive")]
    fn entry_mut(&mut self, index: usize) -> &mut Entry<T> {
        // SAFETY: Every entry is initialized in the ctor and `entry_ptr()` checks bounds.
        unsafe { self.entry_ptr(index).as_mut() }
    }

    fn entry_ptr(&self, index: usize) -> NonNull<Entry<T>> {
        assert!(
            index < self.capacity,
            "entry {index} index out of bounds in descriptor pool of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by the bounds check above.
        unsafe { self.first_entry_ptr.add(index) }
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn get(&self, index: usize) -> &T {
        match &self.entry(index).slot {
            Slot::Occupied { value } => value,
            Slot::Vacant { .. } => panic!(
                "get({index}) slot was vacant in descriptor pool of {}",
                type_name::<T>()
            ),
        }
    }

    /// Returns the key of the current occupant of the slot at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn key(&self, index: usize) -> SlotKey {
        let entry = self.entry(index);

        assert!(
            matches!(entry.slot, Slot::Occupied { .. }),
            "key({index}) slot was vacant in descriptor pool of {}",
            type_name::<T>()
        );

        SlotKey {
            index,
            generation: entry.generation,
        }
    }

    /// Returns a pointer to the item at `index`, valid until the item is removed.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn ptr(&self, index: usize) -> NonNull<T> {
        NonNull::from(self.get(index))
    }

    /// Whether `key` still identifies a live item.
    #[must_use]
    pub(crate) fn contains(&self, key: SlotKey) -> bool {
        if key.index >= self.capacity {
            return false;
        }

        let entry = self.entry(key.index);
        entry.generation == key.generation && matches!(entry.slot, Slot::Occupied { .. })
    }

    /// Reserves the next free slot, or returns `None` if every slot is occupied.
    ///
    /// Nothing is consumed until the returned inserter is used, so abandoning it is a no-op.
    #[must_use]
    pub(crate) fn begin_insert<'p, 'i>(&'p mut self) -> Option<DescriptorPoolInserter<'i, T>>
    where
        'p: 'i,
    {
        #[cfg(debug_assertions)]
        self.integrity_check();

        if self.is_full() {
            return None;
        }

        let index = self.next_free_index;

        Some(DescriptorPoolInserter { pool: self, index })
    }

    /// Drops the item identified by `key` in place and returns its slot to the free stack.
    ///
    /// # Panics
    ///
    /// Panics if the key is stale or the slot is vacant.
    pub(crate) fn remove(&mut self, key: SlotKey) {
        assert!(
            self.contains(key),
            "remove({key:?}) does not identify a live item in descriptor pool of {}",
            type_name::<T>()
        );

        let next_free_index = self.next_free_index;

        {
            let entry = self.entry_mut(key.index);
            entry.generation = entry.generation.wrapping_add(1);
            entry.slot = Slot::Vacant { next_free_index };
        }

        self.next_free_index = key.index;

        self.count = self
            .count
            .checked_sub(1)
            .expect("we asserted above that the slot is occupied so count must be non-zero");
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let mut observed_is_vacant: Vec<bool> = Vec::with_capacity(self.capacity);
        let mut observed_next_free_index: Vec<Option<usize>> = Vec::with_capacity(self.capacity);
        let mut observed_occupied_count: usize = 0;

        for index in 0..self.capacity {
            match &self.entry(index).slot {
                Slot::Occupied { .. } => {
                    observed_is_vacant.push(false);
                    observed_next_free_index.push(None);
                    observed_occupied_count = observed_occupied_count
                        .checked_add(1)
                        .expect("guarded by capacity < usize::MAX in pool ctor");
                }
                Slot::Vacant { next_free_index } => {
                    observed_is_vacant.push(true);
                    observed_next_free_index.push(Some(*next_free_index));
                }
            }
        }

        assert!(
            matches!(observed_is_vacant.get(self.next_free_index), None | Some(true)),
            "self.next_free_index points to an occupied slot {} in descriptor pool of {}",
            self.next_free_index,
            type_name::<T>()
        );

        assert!(
            self.count == observed_occupied_count,
            "self.count {} does not match the observed occupied count {} in descriptor pool of {}",
            self.count,
            observed_occupied_count,
            type_name::<T>()
        );

        for (index, next_free_index) in observed_next_free_index.iter().enumerate() {
            let Some(next_free_index) = *next_free_index else {
                continue;
            };

            if next_free_index == self.capacity {
                // The pool became full once this slot was taken.
                continue;
            }

            assert!(
                observed_is_vacant
                    .get(next_free_index)
                    .copied()
                    .unwrap_or_default(),
                "slot {index} is vacant but its next_free_index {next_free_index} does not point to a vacant slot in descriptor pool of {}",
                type_name::<T>()
            );
        }
    }
}

impl<T> Drop for DescriptorPool<T> {
    fn drop(&mut self) {
        for index in 0..self.capacity {
            let entry = self.entry_mut(index);

            // Drops any occupant. Intentionally anomalous free index, no more usage expected.
            entry.slot = Slot::Vacant {
                next_free_index: usize::MAX,
            };
        }

        // SAFETY: The layout matches the one used for the allocation.
        unsafe {
            dealloc(
                self.first_entry_ptr.as_ptr().cast(),
                Self::layout(self.capacity),
            );
        }
    }
}

impl<T> fmt::Debug for DescriptorPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity)
            .field("count", &self.count)
            .field("next_free_index", &self.next_free_index)
            .finish_non_exhaustive()
    }
}

// SAFETY: Raw pointers are involved but nothing about them is tied to a thread, so the pool
// can move between threads whenever its items can.
unsafe impl<T: Send> Send for DescriptorPool<T> {}

#[derive(Debug)]
pub(crate) struct DescriptorPoolInserter<'p, T> {
    pool: &'p mut DescriptorPool<T>,

    /// Index at which the item will be inserted.
    index: usize,
}

impl<T> DescriptorPoolInserter<'_, T> {
    /// The key the item will have once inserted.
    #[must_use]
    pub(crate) fn key(&self) -> SlotKey {
        SlotKey {
            index: self.index,
            generation: self.pool.entry(self.index).generation,
        }
    }

    /// Fills the reserved slot and returns a pointer to the item, valid until it is removed.
    pub(crate) fn insert(self, value: T) -> NonNull<T> {
        let mut entry_ptr = self.pool.entry_ptr(self.index);

        // SAFETY: The slot is vacant, so nobody else holds a reference into it, and the pool
        // never creates references to slots other than the ones it is asked about.
        let entry = unsafe { entry_ptr.as_mut() };

        let previous = mem::replace(&mut entry.slot, Slot::Occupied { value });

        self.pool.next_free_index = match previous {
            Slot::Vacant { next_free_index } => next_free_index,
            Slot::Occupied { .. } => panic!(
                "slot {} was not vacant when we inserted into it in descriptor pool of {}",
                self.index,
                type_name::<T>()
            ),
        };

        let ptr = match &entry.slot {
            Slot::Occupied { value } => NonNull::from(value),
            Slot::Vacant { .. } => panic!(
                "slot {} was not occupied after we inserted into it in descriptor pool of {}",
                self.index,
                type_name::<T>()
            ),
        };

        self.pool.count = self
            .pool
            .count
            .checked_add(1)
            .expect("guarded by capacity < usize::MAX in pool ctor");

        ptr
    }
}
