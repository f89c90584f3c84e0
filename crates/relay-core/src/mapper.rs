//! Request-to-key mapping.

use crate::{AggregatedKey, DiscoveryRequest, Result};

/// Computes the aggregated key for a discovery request.
///
/// Implementations apply configured aggregation rules to the request and
/// must be deterministic and side-effect free: the same request always maps
/// to the same key, and there is no fallback key on failure.
///
/// The production implementation lives outside the core; tests supply small
/// rule sets keyed on the request type.
pub trait Mapper: Send + Sync {
    /// Compute the aggregated key for a request.
    ///
    /// Returns [`RelayError::MapperFailure`](crate::RelayError::MapperFailure)
    /// when no rule produces a key.
    fn get_key(&self, request: &DiscoveryRequest) -> Result<AggregatedKey>;
}
