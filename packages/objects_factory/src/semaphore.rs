use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::WaitError;
use crate::constants::ERR_POISONED_LOCK;

/// A counting semaphore with a signed count.
///
/// A non-negative count is the number of [`wait()`][Self::wait] calls that can complete
/// without blocking. A negative count `-n` means `n` waiters are queued (or, if the
/// semaphore was created with a negative count, are owed signals before anyone can pass).
///
/// # Example
///
/// ```rust
/// use std::thread;
///
/// use objects_factory::Semaphore;
///
/// let sem = Semaphore::new(0);
///
/// thread::scope(|s| {
///     s.spawn(|| sem.wait().unwrap());
///     sem.signal();
/// });
///
/// assert_eq!(sem.count(), 0);
/// ```
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
    wakeup: Condvar,
}

#[derive(Debug)]
struct SemaphoreState {
    count: isize,

    /// Waiters queued and not yet granted a signal.
    blocked: usize,

    /// Signals granted to blocked waiters but not yet picked up by any of them.
    granted: usize,

    /// Bumped by every reset. Waiters that started in an older epoch were reset away.
    epoch: u64,
}

impl Semaphore {
    /// Creates a semaphore with the given initial count.
    #[must_use]
    pub fn new(count: isize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                count,
                blocked: 0,
                granted: 0,
                epoch: 0,
            }),
            wakeup: Condvar::new(),
        }
    }

    /// The current count.
    #[must_use]
    pub fn count(&self) -> isize {
        self.lock().count
    }

    /// Decrements the count, blocking while it is negative until signaled.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Reset`] if the semaphore is reset while waiting.
    pub fn wait(&self) -> Result<(), WaitError> {
        self.wait_until(None)
    }

    /// Like [`wait()`][Self::wait] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if not signaled in time, in which case the count is
    /// restored, or [`WaitError::Reset`] if the semaphore is reset while waiting.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), WaitError> {
        // A deadline too far out to represent is as good as none.
        self.wait_until(Instant::now().checked_add(timeout))
    }

    /// Decrements the count only if that does not require waiting.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if the count is not positive.
    pub fn try_wait(&self) -> Result<(), WaitError> {
        let mut state = self.lock();

        if state.count > 0 {
            state.count = state.count.wrapping_sub(1);
            Ok(())
        } else {
            Err(WaitError::Timeout)
        }
    }

    /// Increments the count, waking one waiter if any is queued.
    ///
    /// When the count was made negative at creation rather than by waiters, signals first pay
    /// off that debt and only then release real waiters.
    pub fn signal(&self) {
        let mut state = self.lock();

        state.count = state
            .count
            .checked_add(1)
            .expect("semaphore count overflow is not a realistic possibility");

        // How many must still be queued after this signal.
        let queued = usize::try_from(state.count.saturating_neg()).unwrap_or_default();

        if state.blocked > queued {
            state.blocked = state.blocked.wrapping_sub(1);
            state.granted = state.granted.wrapping_add(1);
            self.wakeup.notify_all();
        }
    }

    /// Sets the count to `count` and makes every current waiter fail with
    /// [`WaitError::Reset`].
    pub fn reset(&self, count: isize) {
        let mut state = self.lock();

        state.count = count;
        state.blocked = 0;
        state.granted = 0;
        state.epoch = state.epoch.wrapping_add(1);

        self.wakeup.notify_all();
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<(), WaitError> {
        let mut state = self.lock();

        state.count = state
            .count
            .checked_sub(1)
            .expect("semaphore count underflow is not a realistic possibility");

        if state.count >= 0 {
            return Ok(());
        }

        let epoch = state.epoch;
        state.blocked = state.blocked.wrapping_add(1);

        loop {
            let (guard, timed_out) = self.block(state, deadline);
            state = guard;

            if state.epoch != epoch {
                return Err(WaitError::Reset);
            }

            if state.granted > 0 {
                state.granted = state.granted.wrapping_sub(1);
                return Ok(());
            }

            if timed_out {
                // Withdraw from the queue.
                state.blocked = state.blocked.wrapping_sub(1);
                state.count = state.count.wrapping_add(1);
                return Err(WaitError::Timeout);
            }
        }
    }

    fn block<'a>(
        &self,
        state: MutexGuard<'a, SemaphoreState>,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, SemaphoreState>, bool) {
        let Some(deadline) = deadline else {
            return (self.wakeup.wait(state).expect(ERR_POISONED_LOCK), false);
        };

        let timeout = deadline.saturating_duration_since(Instant::now());
        let (state, result) = self
            .wakeup
            .wait_timeout(state, timeout)
            .expect(ERR_POISONED_LOCK);

        (state, result.timed_out())
    }

    fn lock(&self) -> MutexGuard<'_, SemaphoreState> {
        self.state.lock().expect(ERR_POISONED_LOCK)
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}
