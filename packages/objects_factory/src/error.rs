use thiserror::Error;

use crate::MAX_NAME_LENGTH;

/// Errors returned by the objects factory.
///
/// Every variant is recoverable and leaves the factory exactly as it was before the call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FactoryError {
    /// A live element with the requested name already exists in the sub-registry.
    #[error("{kind} '{name}' already exists")]
    DuplicateName {
        /// The kind of element that was being created, e.g. "buffer".
        kind: &'static str,

        /// The name that collided.
        name: String,
    },

    /// No live element with the requested name exists in the sub-registry.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// The kind of element that was being looked up.
        kind: &'static str,

        /// The name that was looked up.
        name: String,
    },

    /// A backing allocator could not supply storage for the element.
    #[error("cannot create {kind} '{name}': {resource} exhausted")]
    AllocationFailure {
        /// The kind of element that was being created.
        kind: &'static str,

        /// The name the element would have been registered under.
        name: String,

        /// Which backing resource ran out, e.g. "descriptor pool" or "heap".
        resource: &'static str,
    },

    /// The name cannot be used to identify an element.
    #[error("invalid element name '{name}': {problem}")]
    InvalidName {
        /// The rejected name.
        name: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// An argument other than the name was rejected.
    #[error("invalid argument: {problem}")]
    InvalidArgument {
        /// A human-readable description of the problem.
        problem: String,
    },
}

impl FactoryError {
    pub(crate) fn name_too_long(name: &str) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            problem: format!(
                "{} bytes is longer than the maximum of {MAX_NAME_LENGTH}",
                name.len()
            ),
        }
    }
}

/// Outcome of a blocking operation on a semaphore or mailbox that did not complete.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum WaitError {
    /// The operation could not complete before its deadline. Non-blocking `try_` operations
    /// report this immediately.
    #[error("operation timed out")]
    Timeout,

    /// The object was reset while the caller was waiting, or is still in the reset state.
    #[error("object was reset")]
    Reset,
}

/// A specialized `Result` type for factory operations, returning the crate's
/// [`FactoryError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, FactoryError>;
