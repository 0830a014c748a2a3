use std::fmt;
use std::ops::Deref;

use crate::{FactoryError, MAX_NAME_LENGTH, Result};

/// The identifier of an element within its sub-registry.
///
/// Names are stored inline with a fixed capacity of [`MAX_NAME_LENGTH`] bytes, are compared
/// byte-for-byte and never change after the element is created.
#[derive(Clone, Eq, Hash, PartialEq)]
pub(crate) struct ElementName {
    value: heapless::String<MAX_NAME_LENGTH>,
}

impl ElementName {
    /// # Errors
    ///
    /// Returns [`FactoryError::InvalidName`] if the name is empty or does not fit.
    pub(crate) fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(FactoryError::InvalidName {
                name: String::new(),
                problem: "name must not be empty".to_string(),
            });
        }

        let mut value = heapless::String::new();
        value
            .push_str(name)
            .map_err(|()| FactoryError::name_too_long(name))?;

        Ok(Self { value })
    }

    #[must_use]
    pub(crate) fn as_str(&self) -> &str {
        &self.value
    }
}

impl Deref for ElementName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl PartialEq<str> for ElementName {
    fn eq(&self, other: &str) -> bool {
        self.as_str().as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
