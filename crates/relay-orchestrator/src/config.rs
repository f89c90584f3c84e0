//! Orchestrator configuration.

use std::time::Duration;

/// How responses are delivered to a watch over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// A watch receives at most one response, then detaches from its key;
    /// the downstream surface re-registers with its next request.
    #[default]
    SingleShot,
    /// A watch stays attached and its channel sees every newer version
    /// until it is cancelled.
    Continuous,
}

impl DeliveryMode {
    /// Whether a delivered watch detaches from its key.
    #[inline]
    #[must_use]
    pub fn is_single_shot(&self) -> bool {
        matches!(self, Self::SingleShot)
    }
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Cache entry bound; zero means unbounded.
    pub cache_max_entries: usize,
    /// Cache entry lifetime; zero disables expiration.
    pub cache_ttl: Duration,
    /// Per-watch delivery policy.
    pub delivery_mode: DeliveryMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: 4096,
            cache_ttl: Duration::from_secs(12 * 60 * 60),
            delivery_mode: DeliveryMode::SingleShot,
        }
    }
}
