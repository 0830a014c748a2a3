use crate::{Handle, Registry, Result, Semaphore};

const KIND: &str = "semaphore";

/// A held reference to a dynamic semaphore.
pub type DynamicSemaphore = Handle<Semaphore>;

/// Creates named counting semaphores.
#[derive(Clone, Debug)]
pub(crate) struct DynamicSemaphores {
    registry: Registry<Semaphore>,
}

impl DynamicSemaphores {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            registry: Registry::new(KIND, capacity),
        }
    }

    /// The initial count is forwarded as-is, including negative values.
    pub(crate) fn create(&self, name: &str, initial_count: isize) -> Result<DynamicSemaphore> {
        self.registry
            .register_or_create(name, || Ok(Semaphore::new(initial_count)))
    }

    pub(crate) fn find(&self, name: &str) -> Result<DynamicSemaphore> {
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
    use crate::FactoryError;

    assert_impl_all!(DynamicSemaphore: Send, Sync);

    fn semaphores(capacity: usize) -> DynamicSemaphores {
        DynamicSemaphores::new(capacity)
    }

    #[test]
    fn initial_count_is_forwarded() {
        let semaphores = semaphores(2);

        let positive = semaphores.create("pos", 3).unwrap();
        let negative = semaphores.create("neg", -2).unwrap();

        assert_eq!(positive.count(), 3);
        assert_eq!(negative.count(), -2);
    }

    #[test]
    fn holders_share_one_semaphore() {
        let semaphores = semaphores(1);
        let sem = semaphores.create("mysem", 0).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| semaphores.find("mysem").unwrap().wait());

            sem.signal();

            waiter.join().unwrap().unwrap();
        });

        assert_eq!(sem.count(), 0);
        assert_eq!(sem.refs(), 1);
    }

    #[test]
    fn descriptor_exhaustion_is_allocation_failure() {
        let semaphores = semaphores(1);
        let _first = semaphores.create("a", 0).unwrap();

        assert!(matches!(
            semaphores.create("b", 0),
            Err(FactoryError::AllocationFailure {
                kind: "semaphore",
                resource: "descriptor pool",
                ..
            })
        ));
        assert_eq!(semaphores.len(), 1);
        assert_eq!(semaphores.capacity(), 1);
    }

    #[test]
    fn released_name_creates_fresh_semaphore() {
        let semaphores = semaphores(1);

        let old = semaphores.create("s", 5).unwrap();
        old.release();

        let new = semaphores.create("s", 0).unwrap();
        assert_eq!(new.count(), 0);
    }
}
