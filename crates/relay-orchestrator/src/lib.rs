//! # relay-orchestrator
//!
//! Watch orchestration for the xDS relay.
//!
//! This crate coordinates downstream proxies and upstream configuration
//! servers:
//!
//! - [`Orchestrator`] - Maps requests to aggregated keys, shares one
//!   upstream subscription per key, and fans responses out to all watchers
//! - [`DownstreamMap`] - Registry of per-watch delivery channels
//! - [`UpstreamMap`] - Registry of upstream subscriptions with their
//!   cancellation handles
//! - [`UpstreamClient`] - Trait the upstream gRPC client implements
//!
//! ## Key Design Decisions
//!
//! - The cache holds [`WatchId`](relay_core::WatchId)s, never channels; the
//!   downstream registry is the only owner of channel lifetimes
//! - One fan-out task per upstream subscription publishes to capacity-1
//!   per-watch mailboxes; there is no shared "latest response" cell
//! - Cancelling the last watch for a key leaves the subscription running so
//!   the cached response stays warm; teardown is explicit or eviction-driven
//!
//! ## Example
//!
//! ```rust,ignore
//! use relay_orchestrator::{Orchestrator, OrchestratorConfig};
//!
//! let orchestrator = Orchestrator::builder()
//!     .mapper(rules)
//!     .upstream_client(client)
//!     .config(OrchestratorConfig::default())
//!     .build()?;
//!
//! let (mut responses, cancel) = orchestrator.create_watch(request)?;
//! if let Some(response) = responses.recv().await {
//!     // forward to the proxy
//! }
//! cancel.cancel();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod downstream;
mod orchestrator;
mod upstream;


pub use config::{DeliveryMode, OrchestratorConfig};
pub use downstream::{DownstreamMap, WATCH_CHANNEL_CAPACITY};
pub use orchestrator::{CancelWatch, Orchestrator, OrchestratorBuilder};
pub use upstream::{Subscription, SubscriptionId, UpstreamClient, UpstreamMap};
