use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::constants::ERR_POISONED_LOCK;
use crate::{Heap, HeapLease, WaitError};

/// The value carried by a mailbox slot.
pub type Message = isize;

/// A bounded FIFO queue of [`Message`] values with blocking and non-blocking operations.
///
/// Messages are normally appended at the back with [`post()`][Self::post]. Urgent messages
/// can be placed at the front with [`post_ahead()`][Self::post_ahead] so that they are
/// fetched next.
///
/// [`reset()`][Self::reset] discards all queued messages and puts the mailbox in the reset
/// state: every blocked and every subsequent operation fails with [`WaitError::Reset`] until
/// [`resume()`][Self::resume] is called.
///
/// # Example
///
/// ```rust
/// use objects_factory::Mailbox;
///
/// let mailbox = Mailbox::new(2);
///
/// mailbox.post(1).unwrap();
/// mailbox.post_ahead(2).unwrap();
///
/// assert_eq!(mailbox.fetch(), Ok(2));
/// assert_eq!(mailbox.fetch(), Ok(1));
/// ```
pub struct Mailbox {
    state: Mutex<MailboxState>,

    /// Signaled when a message is added.
    not_empty: Condvar,

    /// Signaled when a slot is freed.
    not_full: Condvar,

    /// Present when the slots were charged against a heap.
    lease: Option<HeapLease>,
}

#[derive(Debug)]
struct MailboxState {
    messages: VecDeque<Message>,
    capacity: usize,
    reset: bool,

    /// Bumped by every reset. Waiters that started in an older epoch were reset away.
    epoch: u64,

    /// Operations currently blocked on either condvar.
    waiting: usize,
}

#[derive(Clone, Copy, Debug)]
enum Deadline {
    Immediate,
    At(Instant),
    Never,
}

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or(Self::Never, Self::At)
    }
}

impl Mailbox {
    /// Creates a mailbox with room for `capacity` messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Mailbox must have non-zero capacity");

        Self::with_storage(VecDeque::with_capacity(capacity), capacity, None)
    }

    /// Creates a mailbox whose slots are charged against `heap`, or returns `None` if the
    /// heap cannot supply them.
    pub(crate) fn from_heap(heap: &Heap, capacity: usize) -> Option<Self> {
        debug_assert!(capacity > 0, "caller validates mailbox capacity");

        let lease = heap.lease(capacity.checked_mul(size_of::<Message>())?)?;

        let mut messages = VecDeque::new();
        messages.try_reserve_exact(capacity).ok()?;

        Some(Self::with_storage(messages, capacity, Some(lease)))
    }

    fn with_storage(
        messages: VecDeque<Message>,
        capacity: usize,
        lease: Option<HeapLease>,
    ) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                messages,
                capacity,
                reset: false,
                epoch: 0,
                waiting: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            lease,
        }
    }

    /// The maximum number of queued messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// The number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    /// Whether no messages are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// The number of messages that can be posted without blocking.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        let state = self.lock();
        state.capacity.saturating_sub(state.messages.len())
    }

    /// Appends a message, blocking while the mailbox is full.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Reset`] if the mailbox is or becomes reset.
    pub fn post(&self, message: Message) -> Result<(), WaitError> {
        self.post_until(message, false, Deadline::Never)
    }

    /// Like [`post()`][Self::post] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if no slot frees up in time or [`WaitError::Reset`]
    /// if the mailbox is or becomes reset.
    pub fn post_timeout(&self, message: Message, timeout: Duration) -> Result<(), WaitError> {
        self.post_until(message, false, Deadline::after(timeout))
    }

    /// Appends a message only if a slot is free right now.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if the mailbox is full or [`WaitError::Reset`] if it
    /// is reset.
    pub fn try_post(&self, message: Message) -> Result<(), WaitError> {
        self.post_until(message, false, Deadline::Immediate)
    }

    /// Places a message at the front, so it is fetched next, blocking while the mailbox is
    /// full.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Reset`] if the mailbox is or becomes reset.
    pub fn post_ahead(&self, message: Message) -> Result<(), WaitError> {
        self.post_until(message, true, Deadline::Never)
    }

    /// Like [`post_ahead()`][Self::post_ahead] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if no slot frees up in time or [`WaitError::Reset`]
    /// if the mailbox is or becomes reset.
    pub fn post_ahead_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        self.post_until(message, true, Deadline::after(timeout))
    }

    /// Places a message at the front only if a slot is free right now.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if the mailbox is full or [`WaitError::Reset`] if it
    /// is reset.
    pub fn try_post_ahead(&self, message: Message) -> Result<(), WaitError> {
        self.post_until(message, true, Deadline::Immediate)
    }

    /// Removes the oldest message, blocking while the mailbox is empty.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Reset`] if the mailbox is or becomes reset.
    pub fn fetch(&self) -> Result<Message, WaitError> {
        self.fetch_until(Deadline::Never)
    }

    /// Like [`fetch()`][Self::fetch] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if no message arrives in time or [`WaitError::Reset`]
    /// if the mailbox is or becomes reset.
    pub fn fetch_timeout(&self, timeout: Duration) -> Result<Message, WaitError> {
        self.fetch_until(Deadline::after(timeout))
    }

    /// Removes the oldest message only if one is queued right now.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if the mailbox is empty or [`WaitError::Reset`] if it
    /// is reset.
    pub fn try_fetch(&self) -> Result<Message, WaitError> {
        self.fetch_until(Deadline::Immediate)
    }

    /// Discards all queued messages and enters the reset state, failing every blocked
    /// operation with [`WaitError::Reset`].
    pub fn reset(&self) {
        let mut state = self.lock();

        state.messages.clear();
        state.reset = true;
        state.epoch = state.epoch.wrapping_add(1);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Leaves the reset state.
    pub fn resume(&self) {
        self.lock().reset = false;
    }

    fn post_until(
        &self,
        message: Message,
        ahead: bool,
        deadline: Deadline,
    ) -> Result<(), WaitError> {
        let mut state = self.lock();
        let epoch = state.epoch;

        loop {
            if state.reset || state.epoch != epoch {
                return Err(WaitError::Reset);
            }

            if state.messages.len() < state.capacity {
                if ahead {
                    state.messages.push_front(message);
                } else {
                    state.messages.push_back(message);
                }

                self.not_empty.notify_one();
                return Ok(());
            }

            state = Self::block(&self.not_full, state, deadline)?;
        }
    }

    fn fetch_until(&self, deadline: Deadline) -> Result<Message, WaitError> {
        let mut state = self.lock();
        let epoch = state.epoch;

        loop {
            if state.reset || state.epoch != epoch {
                return Err(WaitError::Reset);
            }

            if let Some(message) = state.messages.pop_front() {
                self.not_full.notify_one();
                return Ok(message);
            }

            state = Self::block(&self.not_empty, state, deadline)?;
        }
    }

    /// Waits for `condvar` unless the deadline has already passed.
    fn block<'a>(
        condvar: &Condvar,
        mut state: MutexGuard<'a, MailboxState>,
        deadline: Deadline,
    ) -> Result<MutexGuard<'a, MailboxState>, WaitError> {
        let timeout = match deadline {
            Deadline::Immediate => return Err(WaitError::Timeout),
            Deadline::Never => None,
            Deadline::At(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());

                if remaining.is_zero() {
                    return Err(WaitError::Timeout);
                }

                Some(remaining)
            }
        };

        state.waiting = state.waiting.wrapping_add(1);

        let mut state = if let Some(timeout) = timeout {
            let (state, _) = condvar
                .wait_timeout(state, timeout)
                .expect(ERR_POISONED_LOCK);
            state
        } else {
            condvar.wait(state).expect(ERR_POISONED_LOCK)
        };

        state.waiting = state.waiting.wrapping_sub(1);

        Ok(state)
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().expect(ERR_POISONED_LOCK)
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();

        f.debug_struct("Mailbox")
            .field("capacity", &state.capacity)
            .field("len", &state.messages.len())
            .field("reset", &state.reset)
            .field("waiting", &state.waiting)
            .field("heap_bytes", &self.lease.as_ref().map(HeapLease::size))
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Mailbox: Send, Sync, fmt::Debug);

    fn await_waiting(mailbox: &Mailbox, expected: usize) {
        while mailbox.lock().waiting != expected {
            thread::yield_now();
        }
    }

    #[test]
    fn fifo_order() {
        let mailbox = Mailbox::new(3);

        mailbox.post(1).unwrap();
        mailbox.post(2).unwrap();
        mailbox.post(3).unwrap();

        assert_eq!(mailbox.len(), 3);
        assert_eq!(mailbox.free_slots(), 0);
        assert_eq!(mailbox.fetch(), Ok(1));
        assert_eq!(mailbox.fetch(), Ok(2));
        assert_eq!(mailbox.fetch(), Ok(3));
        assert!(mailbox.is_empty());
    }

    #[test]
    fn post_ahead_jumps_queue() {
        let mailbox = Mailbox::new(3);

        mailbox.post(1).unwrap();
        mailbox.try_post_ahead(-7).unwrap();

        assert_eq!(mailbox.try_fetch(), Ok(-7));
        assert_eq!(mailbox.try_fetch(), Ok(1));
    }

    #[test]
    fn try_operations_do_not_block() {
        let mailbox = Mailbox::new(1);

        assert_eq!(mailbox.try_fetch(), Err(WaitError::Timeout));

        mailbox.try_post(5).unwrap();
        assert_eq!(mailbox.try_post(6), Err(WaitError::Timeout));
        assert_eq!(mailbox.try_post_ahead(6), Err(WaitError::Timeout));
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn timeouts_expire() {
        let mailbox = Mailbox::new(1);

        assert_eq!(
            mailbox.fetch_timeout(Duration::from_millis(10)),
            Err(WaitError::Timeout)
        );

        mailbox.post(1).unwrap();

        assert_eq!(
            mailbox.post_timeout(2, Duration::from_millis(10)),
            Err(WaitError::Timeout)
        );
        assert_eq!(
            mailbox.post_ahead_timeout(2, Duration::from_millis(10)),
            Err(WaitError::Timeout)
        );
    }

    #[test]
    fn blocked_fetch_receives_post() {
        let mailbox = Mailbox::new(1);

        thread::scope(|s| {
            let receiver = s.spawn(|| mailbox.fetch());

            mailbox.post(99).unwrap();

            assert_eq!(receiver.join().unwrap(), Ok(99));
        });
    }

    #[test]
    fn blocked_post_proceeds_after_fetch() {
        let mailbox = Mailbox::new(1);
        mailbox.post(1).unwrap();

        thread::scope(|s| {
            let sender = s.spawn(|| mailbox.post(2));

            assert_eq!(mailbox.fetch(), Ok(1));
            sender.join().unwrap().unwrap();
        });

        assert_eq!(mailbox.fetch(), Ok(2));
    }

    #[test]
    fn reset_fails_blocked_and_later_operations_until_resumed() {
        let mailbox = Mailbox::new(1);

        thread::scope(|s| {
            let receiver = s.spawn(|| mailbox.fetch());

            // The receiver may or may not be blocked yet. Either way it must see the reset.
            mailbox.reset();

            assert_eq!(receiver.join().unwrap(), Err(WaitError::Reset));
        });

        assert_eq!(mailbox.try_post(1), Err(WaitError::Reset));
        assert_eq!(mailbox.try_fetch(), Err(WaitError::Reset));

        mailbox.resume();

        mailbox.try_post(1).unwrap();
        assert_eq!(mailbox.try_fetch(), Ok(1));
    }

    #[test]
    fn reset_fails_waiters_even_if_resumed_before_they_wake() {
        let mailbox = Mailbox::new(1);
        mailbox.post(1).unwrap();

        thread::scope(|s| {
            let sender = s.spawn(|| mailbox.post_timeout(2, Duration::from_secs(60)));

            await_waiting(&mailbox, 1);

            mailbox.reset();
            mailbox.resume();

            assert_eq!(sender.join().unwrap(), Err(WaitError::Reset));
        });

        let empty = Mailbox::new(1);

        thread::scope(|s| {
            let receiver = s.spawn(|| empty.fetch_timeout(Duration::from_secs(60)));

            await_waiting(&empty, 1);

            empty.reset();
            empty.resume();

            assert_eq!(receiver.join().unwrap(), Err(WaitError::Reset));
        });

        // Operations that start after the resume are unaffected.
        empty.try_post(3).unwrap();
        assert_eq!(empty.try_fetch(), Ok(3));
    }

    #[test]
    fn reset_discards_messages() {
        let mailbox = Mailbox::new(2);
        mailbox.post(1).unwrap();
        mailbox.post(2).unwrap();

        mailbox.reset();
        mailbox.resume();

        assert!(mailbox.is_empty());
        assert_eq!(mailbox.free_slots(), 2);
    }

    #[test]
    fn heap_backed_slots_return_to_heap() {
        let heap = Heap::with_limit(4 * size_of::<Message>());

        let mailbox = Mailbox::from_heap(&heap, 4).unwrap();
        assert_eq!(heap.available(), Some(0));
        assert!(Mailbox::from_heap(&heap, 1).is_none());

        drop(mailbox);
        assert_eq!(heap.used(), 0);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_is_panic() {
        drop(Mailbox::new(0));
    }
}
