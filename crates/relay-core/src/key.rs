//! Aggregated keys.
//!
//! An aggregated key groups downstream requests that should share a single
//! upstream subscription. Keys are produced by a [`Mapper`](crate::Mapper)
//! and are opaque to the rest of the relay.

use std::fmt;

/// Key grouping downstream requests into one shared upstream subscription.
///
/// Two requests that map to the same `AggregatedKey` are considered to be
/// asking for the same configuration and are served by one upstream stream.
///
/// # Example
///
/// ```rust
/// use relay_core::AggregatedKey;
///
/// let a = AggregatedKey::new("lds");
/// let b = AggregatedKey::from("lds");
///
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AggregatedKey(String);

impl AggregatedKey {
    /// Create a new aggregated key from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AggregatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AggregatedKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AggregatedKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AggregatedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
