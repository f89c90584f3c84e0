//! # xds-relay
//!
//! Caching xDS relay between data-plane proxies and configuration servers.
//!
//! The relay sits in the middle of many downstream proxies and a smaller
//! number of upstream control planes. Downstream discovery requests that
//! aggregate to the same key share a single upstream subscription, and
//! late-arriving proxies are answered straight from the response cache.
//!
//! ## Architecture
//!
//! This library is organized into several crates:
//!
//! - `relay-core` - Core types, collaborator traits, and error handling
//! - `relay-cache` - Bounded TTL response cache with eviction callbacks
//! - `relay-orchestrator` - Watch orchestration and response fan-out
//!
//! This crate (`xds-relay`) re-exports all public APIs for convenience.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use xds_relay::prelude::*;
//!
//! let orchestrator = Orchestrator::builder()
//!     .mapper(aggregation_rules)
//!     .upstream_client(upstream)
//!     .config(OrchestratorConfig::default())
//!     .build()?;
//!
//! // One call per downstream discovery request.
//! let (mut responses, cancel) = orchestrator.create_watch(request)?;
//! if let Some(response) = responses.recv().await {
//!     // forward to the proxy
//! }
//! cancel.cancel();
//! ```
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - All errors are returned as `Result`
//! 2. **No locks held across await points** - Registries and cache use
//!    short, I/O-free critical sections
//! 3. **Channels over shared state** - Responses travel through per-watch
//!    mailboxes, never a shared "latest" cell

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

// Re-export all sub-crates
pub use relay_cache as cache;
pub use relay_core as core;
pub use relay_orchestrator as orchestrator;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use xds_relay::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use relay_core::{
        AggregatedKey, DiscoveryRequest, DiscoveryResponse, Mapper, RelayError, Result, WatchId,
    };

    // Cache
    pub use relay_cache::{
        CacheConfig, CacheEntry, CacheStats, ReadOnlyCache, ResponseCache,
    };

    // Orchestration
    pub use relay_orchestrator::{
        CancelWatch, DeliveryMode, Orchestrator, OrchestratorBuilder, OrchestratorConfig,
        UpstreamClient,
    };
}
