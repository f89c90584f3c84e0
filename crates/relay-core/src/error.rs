//! Error types for relay operations.
//!
//! This module provides [`RelayError`], the error type shared by the cache,
//! the orchestrator, and the collaborator traits.

use crate::AggregatedKey;

/// Error type for relay operations.
///
/// Covers every failure mode of the core without panics. Expected conditions
/// (a cache miss, an upstream stream closing) and genuine bugs (storage
/// corruption) use distinct variants so callers can tell them apart.
///
/// # Example
///
/// ```rust
/// use relay_core::{AggregatedKey, RelayError};
///
/// fn lookup(found: bool, key: &AggregatedKey) -> Result<(), RelayError> {
///     if !found {
///         return Err(RelayError::NotFound { key: key.clone() });
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Rejected configuration, e.g. a negative cache TTL.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration was rejected.
        reason: String,
    },

    /// No cache entry exists for the key.
    ///
    /// Expected during normal operation: the key was never populated, or was
    /// just lazily evicted.
    #[error("no value found for key: {key}")]
    NotFound {
        /// The aggregated key that missed.
        key: AggregatedKey,
    },

    /// The mapper could not compute an aggregated key for a request.
    #[error("unable to map request to aggregated key: {reason}")]
    MapperFailure {
        /// Reason the mapping failed.
        reason: String,
    },

    /// Cache storage held a value of the wrong shape for the key.
    ///
    /// Treated as a bug; callers may abort.
    #[error("corrupt cache entry for key: {key}")]
    TypeMismatch {
        /// The aggregated key whose entry is corrupt.
        key: AggregatedKey,
    },

    /// The upstream response channel closed.
    ///
    /// Informational; the fan-out loop for the key exits cleanly.
    #[error("upstream stream closed for key: {key}")]
    UpstreamClosed {
        /// The aggregated key whose stream closed.
        key: AggregatedKey,
    },

    /// A downstream watch channel was closed before delivery.
    #[error("watch closed: watch_id={id}")]
    WatchClosed {
        /// ID of the closed watch.
        id: u64,
    },
}

impl RelayError {
    /// Create a mapper failure from any displayable reason.
    pub fn mapper(reason: impl Into<String>) -> Self {
        Self::MapperFailure {
            reason: reason.into(),
        }
    }

    /// Whether this error is an expected cache miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
