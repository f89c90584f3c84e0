//! Downstream watch registry.
//!
//! Maps each live watch to the channel the orchestrator delivers on. The
//! registry owns the sender half; the receiver is handed to the downstream
//! surface by `create_watch`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use relay_core::{DiscoveryResponse, WatchId};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Capacity of every watch channel.
///
/// One slot: a watch sees at most one undelivered response, matching the
/// one-response-per-request pacing of the discovery protocol.
pub const WATCH_CHANNEL_CAPACITY: usize = 1;

type ResponseSender = mpsc::Sender<Arc<DiscoveryResponse>>;

/// Registry of downstream watch channels, keyed by watch id.
///
/// Lock scope is a handful of map operations; the registry never performs
/// I/O and never sends while holding its lock.
#[derive(Debug, Default)]
pub struct DownstreamMap {
    channels: Mutex<HashMap<WatchId, ResponseSender>>,
}

impl DownstreamMap {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sender half of a new watch channel.
    pub fn register(&self, id: WatchId, sender: ResponseSender) {
        let mut channels = self.channels.lock().expect("downstream lock poisoned");
        channels.insert(id, sender);
        trace!(watch = %id, "registered watch channel");
    }

    /// Get the sender for a watch, if it is still registered.
    pub fn sender(&self, id: WatchId) -> Option<ResponseSender> {
        let channels = self.channels.lock().expect("downstream lock poisoned");
        channels.get(&id).cloned()
    }

    /// Remove a watch, closing its channel.
    ///
    /// A missing id is a no-op, so cancellation stays idempotent.
    pub fn unregister(&self, id: WatchId) {
        let mut channels = self.channels.lock().expect("downstream lock poisoned");
        if channels.remove(&id).is_some() {
            debug!(watch = %id, "unregistered watch channel");
        }
    }

    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.channels.lock().expect("downstream lock poisoned").len()
    }

    /// Whether no watches are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
