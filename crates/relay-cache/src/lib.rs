//! # relay-cache
//!
//! Response cache for the xDS relay.
//!
//! This crate keeps the most recent upstream response per aggregated key:
//!
//! - [`ResponseCache`] - Bounded LRU cache with lazy TTL expiration
//! - [`CacheEntry`] - The response plus the set of watches waiting on a key
//! - [`ReadOnlyCache`] - Introspection handle that cannot mutate
//! - [`CacheStats`] - Atomic counters for monitoring
//!
//! ## Key Design Decisions
//!
//! - Storage is an `lru::LruCache` behind a `std::sync::RwLock`; every lock
//!   is a short, I/O-free critical section
//! - TTL eviction is lazy: only `fetch` realizes expiry, re-checked under
//!   the exclusive lock so a concurrent `set_response` is never clobbered
//! - The eviction callback fires synchronously inside the cache mutation
//!   and therefore must not call back into the cache
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relay_cache::ResponseCache;
//! use relay_core::{AggregatedKey, DiscoveryResponse, WatchId};
//!
//! let cache = ResponseCache::new(1024, Duration::from_secs(60));
//! let key = AggregatedKey::new("lds");
//!
//! cache.add_request(&key, WatchId::next());
//! let watchers = cache.set_response(&key, Arc::new(DiscoveryResponse::default()));
//! assert_eq!(watchers.len(), 1);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod stats;

pub use cache::{CacheBuilder, CacheConfig, CacheEntry, EvictionCallback, ReadOnlyCache, ResponseCache};
pub use stats::CacheStats;
