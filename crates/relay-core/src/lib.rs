//! # relay-core
//!
//! Core types, traits, and error handling for the xDS relay.
//!
//! This crate provides the foundational types used across the relay crates:
//!
//! - [`RelayError`] - Error type covering every relay failure mode
//! - [`AggregatedKey`] - Key grouping downstream requests into one upstream subscription
//! - [`WatchId`] - Stable identity for a single downstream watch
//! - [`DiscoveryRequest`] / [`DiscoveryResponse`] - The discovery messages the relay forwards
//! - [`Mapper`] - Trait computing an aggregated key from a request
//!
//! ## Example
//!
//! ```rust
//! use relay_core::{AggregatedKey, WatchId};
//!
//! let key = AggregatedKey::new("lds");
//! let watch = WatchId::next();
//!
//! assert_eq!(key.as_str(), "lds");
//! assert_ne!(watch, WatchId::next());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod discovery;
mod error;
mod key;
mod mapper;
mod watch;

pub use discovery::{DiscoveryRequest, DiscoveryResponse};
pub use error::RelayError;
pub use key::AggregatedKey;
pub use mapper::Mapper;
pub use watch::WatchId;

/// Result type alias using [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;
