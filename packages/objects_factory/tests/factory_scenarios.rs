//! End-to-end scenarios for `objects_factory`.
//!
//! Each test drives the public API the way cooperating tasks would: create or register an
//! element, share it by name, and release every reference until the element is gone.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use objects_factory::{DropPolicy, FactoryError, Heap, ObjectsFactory, WaitError};

fn factory() -> ObjectsFactory {
    _ = tracing_subscriber::fmt::try_init();

    ObjectsFactory::builder()
        .drop_policy(DropPolicy::MustNotDropItems)
        .build()
}

#[test]
fn registered_object_lifecycle() {
    let factory = factory();

    let cell = Arc::new(AtomicU32::new(0x55AA));
    let other_cell = Arc::new(AtomicU32::new(0));

    let object = factory.register_object("myobj", &cell).unwrap();
    assert_eq!(object.refs(), 1);

    assert!(matches!(
        factory.register_object("myobj", &other_cell),
        Err(FactoryError::DuplicateName { .. })
    ));
    assert_eq!(object.refs(), 1);

    let found = factory.find_object("myobj").unwrap();
    assert!(found.ptr_eq(&object));
    assert_eq!(object.refs(), 2);
    assert_eq!(
        found.get::<AtomicU32>().unwrap().load(Ordering::Relaxed),
        0x55AA
    );

    let duplicate = factory.duplicate_reference(&found);
    assert_eq!(object.refs(), 3);

    factory.release(duplicate);
    assert_eq!(object.refs(), 2);

    factory.release(found);
    assert_eq!(object.refs(), 1);

    factory.release(object);

    assert!(matches!(
        factory.find_object("myobj"),
        Err(FactoryError::NotFound { kind: "object", .. })
    ));

    // The published value was never owned by the factory.
    assert_eq!(cell.load(Ordering::Relaxed), 0x55AA);
}

#[test]
fn dynamic_buffer_lifecycle() {
    let factory = factory();

    let buffer = factory.create_buffer("mybuf", 128).unwrap();
    assert_eq!(buffer.refs(), 1);
    assert_eq!(buffer.len(), 128);
    assert_eq!(factory.heap().used(), 128);

    assert!(matches!(
        factory.create_buffer("mybuf", 128),
        Err(FactoryError::DuplicateName { .. })
    ));

    let found = factory.find_buffer("mybuf").unwrap();
    assert_eq!(buffer.refs(), 2);

    let duplicate = factory.duplicate_reference(&found);
    assert_eq!(buffer.refs(), 3);

    factory.release(duplicate);
    factory.release(found);
    assert_eq!(buffer.refs(), 1);

    factory.release(buffer);

    assert!(matches!(
        factory.find_buffer("mybuf"),
        Err(FactoryError::NotFound { .. })
    ));
    assert_eq!(factory.heap().used(), 0);
}

#[test]
fn dynamic_semaphore_lifecycle() {
    let factory = factory();

    let sem = factory.create_semaphore("mysem", 0).unwrap();
    assert_eq!(sem.refs(), 1);
    assert_eq!(sem.count(), 0);

    assert!(matches!(
        factory.create_semaphore("mysem", 0),
        Err(FactoryError::DuplicateName { .. })
    ));

    let found = factory.find_semaphore("mysem").unwrap();
    assert_eq!(sem.refs(), 2);

    let duplicate = factory.duplicate_reference(&found);
    assert_eq!(sem.refs(), 3);

    factory.release(duplicate);
    factory.release(found);
    assert_eq!(sem.refs(), 1);

    factory.release(sem);

    assert!(matches!(
        factory.find_semaphore("mysem"),
        Err(FactoryError::NotFound { .. })
    ));
}

#[test]
fn heap_exhaustion_leaves_registry_unchanged() {
    _ = tracing_subscriber::fmt::try_init();

    let factory = ObjectsFactory::builder()
        .heap(Heap::with_limit(1000))
        .build();

    let mut buffers = Vec::new();
    let mut failed = None;

    for index in 0..20 {
        let name = format!("buf{index}");

        match factory.create_buffer(&name, 128) {
            Ok(buffer) => buffers.push(buffer),
            Err(error) => {
                assert!(matches!(
                    error,
                    FactoryError::AllocationFailure {
                        resource: "heap",
                        ..
                    }
                ));
                failed = Some(name);
                break;
            }
        }
    }

    let failed = failed.expect("a 1000 byte heap cannot hold 20 buffers of 128 bytes");

    assert_eq!(buffers.len(), 7);
    assert_eq!(factory.buffer_count(), 7);
    assert!(matches!(
        factory.find_buffer(&failed),
        Err(FactoryError::NotFound { .. })
    ));

    // Releasing one buffer makes room again.
    buffers.pop().unwrap().release();
    factory.create_buffer(&failed, 128).unwrap().release();
}

#[test]
fn descriptor_exhaustion_leaves_registry_unchanged() {
    let factory = ObjectsFactory::builder().max_semaphores(2).build();

    let _a = factory.create_semaphore("a", 0).unwrap();
    let _b = factory.create_semaphore("b", 0).unwrap();

    assert!(matches!(
        factory.create_semaphore("c", 0),
        Err(FactoryError::AllocationFailure {
            resource: "descriptor pool",
            ..
        })
    ));
    assert!(factory.find_semaphore("c").is_err());
    assert_eq!(factory.semaphore_count(), 2);
}

#[test]
fn concurrent_finds_see_same_element() {
    let factory = factory();
    let sem = factory.create_semaphore("mysem", 0).unwrap();

    let barrier = Barrier::new(2);

    let found: Vec<_> = thread::scope(|s| {
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    factory.find_semaphore("mysem").unwrap()
                })
            })
            .collect();

        tasks.into_iter().map(|task| task.join().unwrap()).collect()
    });

    assert!(found.iter().all(|handle| handle.ptr_eq(&sem)));
    assert_eq!(sem.refs(), 3);

    drop(found);
    assert_eq!(sem.refs(), 1);
}

#[test]
fn find_racing_final_release_sees_live_element_or_nothing() {
    let factory = factory();

    for round in 0..100 {
        let sem = factory.create_semaphore("victim", round).unwrap();
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                factory.release(sem);
            });

            s.spawn(|| {
                barrier.wait();

                match factory.find_semaphore("victim") {
                    Ok(found) => assert_eq!(found.count(), round),
                    Err(error) => assert!(matches!(error, FactoryError::NotFound { .. })),
                }
            });
        });

        assert_eq!(factory.semaphore_count(), 0);
    }
}

#[test]
fn mailbox_carries_messages_between_tasks() {
    let factory = factory();
    let requests = factory.create_mailbox("requests", 4).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            let requests = factory.find_mailbox("requests").unwrap();

            for message in 1..=8 {
                requests.post(message).unwrap();
            }
        });

        let received: Vec<_> = (0..8).map(|_| requests.fetch().unwrap()).collect();
        assert_eq!(received, (1..=8).collect::<Vec<_>>());
    });

    assert_eq!(
        requests.fetch_timeout(Duration::from_millis(10)),
        Err(WaitError::Timeout)
    );
}

#[test]
fn invalid_names_are_rejected_everywhere() {
    let factory = factory();

    assert!(matches!(
        factory.create_semaphore("", 0),
        Err(FactoryError::InvalidName { .. })
    ));
    assert!(matches!(
        factory.create_buffer("ninechars", 1),
        Err(FactoryError::InvalidName { .. })
    ));
    assert!(matches!(
        factory.create_mailbox("ninechars", 1),
        Err(FactoryError::InvalidName { .. })
    ));

    // Exactly at the limit is fine.
    factory.create_semaphore("eightchr", 0).unwrap().release();
}
