/// Maximum length of an element name, in bytes of UTF-8.
pub const MAX_NAME_LENGTH: usize = 8;

/// Descriptor pool capacity used by each sub-registry unless the builder says otherwise.
pub(crate) const DEFAULT_MAX_ELEMENTS: usize = 32;

pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - continued execution is not safe because we can no longer ensure that we uphold security and privacy guarantees";
