#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! This package provides [`ObjectsFactory`], a runtime catalog that lets concurrent tasks
//! create, look up by name, share and release kernel objects without inventing their own
//! naming, lifetime or locking schemes.
//!
//! # Object kinds
//!
//! Each kind lives in its own sub-registry, enabled by a Cargo feature (all on by default):
//!
//! - **Registered objects** (`objects_registry`): a caller-owned value published under a
//!   name. The factory only keeps a weak reference to it.
//! - **Dynamic buffers** (`generic_buffers`): a fixed-size byte region allocated from the
//!   factory's [`Heap`].
//! - **Dynamic semaphores** (`semaphores`): a counting [`Semaphore`].
//! - **Dynamic mailboxes** (`mailboxes`): a bounded [`Mailbox`] of messages whose slots are
//!   charged to the heap.
//!
//! A disabled kind is absent from the API entirely.
//!
//! # Names and references
//!
//! Names are at most [`MAX_NAME_LENGTH`] bytes and unique among the live elements of one
//! sub-registry. Every create, register or find returns a [`Handle`] holding one reference.
//! Cloning a handle takes another reference and dropping it gives the reference back. The
//! element is destroyed, and its name becomes free, when its last reference is released.
//!
//! Every sub-registry has a fixed number of descriptors, set through
//! [`ObjectsFactory::builder()`]. When they are all in use, creating another element fails
//! with [`FactoryError::AllocationFailure`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::thread;
//!
//! use objects_factory::ObjectsFactory;
//!
//! let factory = ObjectsFactory::new();
//!
//! let value = Arc::new(AtomicU32::new(0x55AA));
//! let object = factory.register_object("myobj", &value)?;
//! let ready = factory.create_semaphore("ready", 0)?;
//!
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         let object = factory.find_object("myobj").unwrap();
//!         let value = object.get::<AtomicU32>().unwrap();
//!         value.fetch_add(1, Ordering::Relaxed);
//!
//!         factory.find_semaphore("ready").unwrap().signal();
//!     });
//!
//!     ready.wait().unwrap();
//! });
//!
//! assert_eq!(value.load(Ordering::Relaxed), 0x55AB);
//! assert_eq!(object.refs(), 1);
//! # Ok::<(), objects_factory::FactoryError>(())
//! ```

mod builder;
mod constants;
mod descriptor_pool;
mod drop_policy;
mod element;
mod error;
mod factory;
mod handle;
mod name;
mod registry;

#[cfg(feature = "generic_buffers")]
mod buffers;
#[cfg(feature = "heap")]
mod heap;
#[cfg(feature = "mailboxes")]
mod mailbox;
#[cfg(feature = "mailboxes")]
mod mailboxes;
#[cfg(feature = "objects_registry")]
mod objects;
#[cfg(feature = "semaphores")]
mod semaphore;
#[cfg(feature = "semaphores")]
mod semaphores;

pub use builder::*;
pub use constants::*;
pub(crate) use descriptor_pool::*;
pub use drop_policy::*;
pub(crate) use element::*;
pub use error::*;
pub use factory::*;
pub use handle::*;
pub(crate) use name::*;
pub(crate) use registry::*;

#[cfg(feature = "generic_buffers")]
pub use buffers::*;
#[cfg(feature = "heap")]
pub use heap::*;
#[cfg(feature = "mailboxes")]
pub use mailbox::*;
#[cfg(feature = "mailboxes")]
pub use mailboxes::*;
#[cfg(feature = "objects_registry")]
pub use objects::*;
#[cfg(feature = "semaphores")]
pub use semaphore::*;
#[cfg(feature = "semaphores")]
pub use semaphores::*;
