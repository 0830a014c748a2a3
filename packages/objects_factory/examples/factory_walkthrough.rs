//! Walks through every kind of element the `objects_factory` crate manages:
//!
//! * Publishing a caller-owned value under a name.
//! * Sharing a heap-allocated buffer between tasks.
//! * Handing off work with a semaphore and a mailbox.
//! * Running out of heap and descriptors.
//!
//! Run with `RUST_LOG=trace` to see the factory's own log events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use objects_factory::{FactoryError, Heap, ObjectsFactory};

fn main() -> Result<(), FactoryError> {
    tracing_subscriber::fmt::init();

    let factory = ObjectsFactory::builder()
        .max_buffers(4)
        .heap(Heap::with_limit(512))
        .build();

    // The factory only keeps a weak reference to a registered value.
    let config = Arc::new(AtomicU32::new(0x55AA));
    let object = factory.register_object("config", &config)?;

    let buffer = factory.create_buffer("frame", 256)?;
    let ready = factory.create_semaphore("ready", 0)?;
    let results = factory.create_mailbox("results", 4)?;

    println!("Heap after setup: {:?}", factory.heap());

    thread::scope(|s| {
        s.spawn(|| {
            // A worker that only knows the names.
            let config = factory.find_object("config").unwrap();
            let frame = factory.find_buffer("frame").unwrap();

            let seed = config.get::<AtomicU32>().unwrap().load(Ordering::Relaxed);

            {
                let mut bytes = frame.lock();

                for (index, byte) in bytes.iter_mut().enumerate() {
                    *byte = u8::try_from(index % 256).unwrap();
                }
            }

            factory.find_semaphore("ready").unwrap().signal();

            let results = factory.find_mailbox("results").unwrap();
            results.post(isize::try_from(seed).unwrap()).unwrap();
            results.post(frame.len().try_into().unwrap()).unwrap();
        });

        ready.wait().unwrap();
        println!("Worker filled the frame, last byte is {}", buffer.lock()[255]);

        println!("Worker reported seed {:#x}", results.fetch().unwrap());
        println!("Worker reported frame size {}", results.fetch().unwrap());
    });

    // Everything the worker found has been released again.
    println!("Object refs after worker: {}", object.refs());

    match factory.create_buffer("big", 1024) {
        Err(error) => println!("Expected failure: {error}"),
        Ok(_) => unreachable!("a 512 byte heap cannot hold another 1024 bytes"),
    }

    match factory.create_buffer("frame", 16) {
        Err(error) => println!("Expected failure: {error}"),
        Ok(_) => unreachable!("the name 'frame' is still in use"),
    }

    factory.release(buffer);
    println!("Heap after releasing the frame: {:?}", factory.heap());

    // The name is free for a new element now.
    let buffer = factory.create_buffer("frame", 16)?;
    println!("Recreated frame with {} bytes", buffer.len());

    drop(config);
    println!("Registered value still alive: {}", object.is_alive());

    Ok(())
}
