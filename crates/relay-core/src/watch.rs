//! Watch identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity for a single downstream watch.
///
/// A `WatchId` is minted for each `create_watch` call and is the handle the
/// cache and the downstream registry use to refer to that watch. The id is
/// never reused, so a stale handle can only miss, never alias a newer watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    /// Mint a new unique watch ID.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value of this watch ID.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}
