//! Upstream stream registry and client interface.
//!
//! At most one upstream subscription exists per aggregated key. The
//! registry stores a cancellation handle per key; the response channel
//! itself is consumed by the subscription's fan-out task.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use relay_core::{AggregatedKey, DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Opens streaming subscriptions against upstream configuration servers.
///
/// One call opens one stream for one aggregated key. The client owns the
/// sender half of the returned channel and is expected to reconnect
/// internally; the orchestrator tolerates the channel closing. Dropping the
/// receiver is the client-visible signal that the subscription was
/// cancelled.
pub trait UpstreamClient: Send + Sync {
    /// Open a stream for the given request and yield its responses.
    fn open_stream(&self, request: DiscoveryRequest) -> mpsc::Receiver<DiscoveryResponse>;
}

/// Unique identifier for one upstream subscription.
///
/// Lets a fan-out task remove its own registry entry without racing a newer
/// subscription created under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Mint a new unique subscription ID.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle to one live upstream subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Identity of this subscription.
    pub id: SubscriptionId,
    /// Cancels the subscription's fan-out task, which in turn drops the
    /// upstream receiver.
    pub cancel: CancellationToken,
}

/// Registry of upstream subscriptions, keyed by aggregated key.
#[derive(Debug, Default)]
pub struct UpstreamMap {
    subscriptions: Mutex<HashMap<AggregatedKey, Subscription>>,
}

impl UpstreamMap {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a subscription exists for the key.
    pub fn contains(&self, key: &AggregatedKey) -> bool {
        self.subscriptions
            .lock()
            .expect("upstream lock poisoned")
            .contains_key(key)
    }

    /// Insert a subscription unless the key already has one.
    ///
    /// Returns `false` when an existing subscription won the race; the
    /// caller then cancels its extra stream by dropping it.
    pub fn try_insert(&self, key: &AggregatedKey, subscription: Subscription) -> bool {
        let mut subscriptions = self.subscriptions.lock().expect("upstream lock poisoned");
        if subscriptions.contains_key(key) {
            return false;
        }
        subscriptions.insert(key.clone(), subscription);
        true
    }

    /// Remove the subscription for a key, cancelling it.
    ///
    /// Returns whether a subscription was present. The cancellation handle
    /// fires at most once per subscription because removal takes it out of
    /// the map.
    pub fn remove(&self, key: &AggregatedKey) -> bool {
        let removed = {
            let mut subscriptions = self.subscriptions.lock().expect("upstream lock poisoned");
            subscriptions.remove(key)
        };
        match removed {
            Some(subscription) => {
                debug!(key = %key, subscription = %subscription.id, "cancelled upstream subscription");
                subscription.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the subscription for a key only if it is the given one.
    ///
    /// Used by a fan-out task observing its upstream channel close: a newer
    /// subscription under the same key must not be torn down by the old
    /// task's exit.
    pub fn remove_if(&self, key: &AggregatedKey, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock().expect("upstream lock poisoned");
        if subscriptions.get(key).is_some_and(|sub| sub.id == id) {
            subscriptions.remove(key);
            return true;
        }
        false
    }

    /// Remove and cancel every subscription.
    pub fn cancel_all(&self) {
        let drained: Vec<(AggregatedKey, Subscription)> = {
            let mut subscriptions = self.subscriptions.lock().expect("upstream lock poisoned");
            subscriptions.drain().collect()
        };
        for (key, subscription) in drained {
            debug!(key = %key, subscription = %subscription.id, "cancelled upstream subscription");
            subscription.cancel.cancel();
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions
            .lock()
            .expect("upstream lock poisoned")
            .len()
    }

    /// Whether no subscriptions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription() -> Subscription {
        Subscription {
            id: SubscriptionId::next(),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn subscription_id_unique() {
        assert_ne!(SubscriptionId::next(), SubscriptionId::next());
    }

    #[test]
    fn try_insert_enforces_at_most_one() {
        let map = UpstreamMap::new();
        let key = AggregatedKey::new("lds");

        assert!(map.try_insert(&key, subscription()));
        assert!(!map.try_insert(&key, subscription()));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_cancels_token() {
        let map = UpstreamMap::new();
        let key = AggregatedKey::new("lds");
        let sub = subscription();
        let token = sub.cancel.clone();

        map.try_insert(&key, sub);
        assert!(map.remove(&key));
        assert!(token.is_cancelled());

        // Second removal finds nothing.
        assert!(!map.remove(&key));
    }

    #[test]
    fn remove_if_skips_newer_subscription() {
        let map = UpstreamMap::new();
        let key = AggregatedKey::new("lds");

        let old = subscription();
        let old_id = old.id;
        map.try_insert(&key, old);

        // The old subscription is replaced after an explicit removal.
        map.remove(&key);
        let newer = subscription();
        map.try_insert(&key, newer);

        assert!(!map.remove_if(&key, old_id));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_if_matches_own_subscription() {
        let map = UpstreamMap::new();
        let key = AggregatedKey::new("cds");
        let sub = subscription();
        let id = sub.id;

        map.try_insert(&key, sub);
        assert!(map.remove_if(&key, id));
        assert!(map.is_empty());
    }

    #[test]
    fn cancel_all_drains() {
        let map = UpstreamMap::new();
        let first = subscription();
        let second = subscription();
        let tokens = [first.cancel.clone(), second.cancel.clone()];

        map.try_insert(&AggregatedKey::new("lds"), first);
        map.try_insert(&AggregatedKey::new("cds"), second);

        map.cancel_all();
        assert!(map.is_empty());
        assert!(tokens.iter().all(|t| t.is_cancelled()));
    }
}
