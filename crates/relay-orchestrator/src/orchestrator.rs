//! The orchestrator.
//!
//! Coordinates the response cache, the downstream watch registry, and the
//! upstream stream registry: it maps incoming requests to aggregated keys,
//! keeps at most one upstream subscription per key, and fans responses out
//! to every watch attached to a key.

use std::fmt;
use std::sync::Arc;

use relay_cache::{ReadOnlyCache, ResponseCache};
use relay_core::{
    AggregatedKey, DiscoveryRequest, DiscoveryResponse, Mapper, RelayError, Result, WatchId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeliveryMode, OrchestratorConfig};
use crate::downstream::{DownstreamMap, WATCH_CHANNEL_CAPACITY};
use crate::upstream::{Subscription, SubscriptionId, UpstreamClient, UpstreamMap};

/// The relay coordinator.
///
/// One orchestrator serves the whole process. `create_watch` is called from
/// the downstream gRPC surface for every discovery request; a fan-out task
/// runs per upstream subscription and delivers each response to all watches
/// attached to its key.
///
/// ## Teardown
///
/// Cancelling a watch never tears down its key's subscription: the
/// subscription stays up, keeping the cached response warm for proxies that
/// reconnect. Subscriptions end only through [`shutdown`](Self::shutdown),
/// cache eviction, or [`shutdown_all`](Self::shutdown_all).
pub struct Orchestrator {
    mapper: Arc<dyn Mapper>,
    upstream_client: Arc<dyn UpstreamClient>,
    cache: Arc<ResponseCache>,
    downstream: Arc<DownstreamMap>,
    upstream: Arc<UpstreamMap>,
    delivery_mode: DeliveryMode,
    root: CancellationToken,
}

impl Orchestrator {
    /// Create a builder for a configured orchestrator.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Register a watch for a downstream request.
    ///
    /// Returns the channel the response will arrive on and an idempotent
    /// cancellation handle. When the cache already holds a response whose
    /// version differs from the request's, that response is delivered
    /// before this call returns.
    ///
    /// A mapper failure is returned to the caller with no state mutated.
    ///
    /// Must be called within a tokio runtime; the first watch for a key
    /// opens the upstream stream and spawns its fan-out task.
    pub fn create_watch(
        &self,
        request: DiscoveryRequest,
    ) -> Result<(mpsc::Receiver<Arc<DiscoveryResponse>>, CancelWatch)> {
        let key = self.mapper.get_key(&request)?;
        let id = WatchId::next();

        let (sender, receiver) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        self.downstream.register(id, sender);
        self.cache.add_request(&key, id);
        debug!(key = %key, watch = %id, "created watch");

        match self.cache.fetch(&key) {
            Ok(entry) => {
                if let Some(response) = &entry.response {
                    if response.version_info != request.version_info {
                        debug!(
                            key = %key,
                            watch = %id,
                            version = %response.version_info,
                            "serving cached response"
                        );
                        // A fresh single-slot channel always has room.
                        deliver_to_watch(
                            &self.cache,
                            &self.downstream,
                            self.delivery_mode,
                            &key,
                            id,
                            response,
                        );
                    }
                }
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        self.ensure_subscription(&key, &request);

        let cancel = CancelWatch {
            key,
            id,
            cache: Arc::clone(&self.cache),
            downstream: Arc::clone(&self.downstream),
        };
        Ok((receiver, cancel))
    }

    /// Tear down the upstream subscription for a key.
    ///
    /// Downstream watches stay registered; their proxies re-attach with
    /// their next request.
    pub fn shutdown(&self, key: &AggregatedKey) {
        if self.upstream.remove(key) {
            info!(key = %key, "upstream subscription shut down");
        }
    }

    /// Tear down every upstream subscription.
    pub fn shutdown_all(&self) {
        info!("shutting down all upstream subscriptions");
        self.root.cancel();
        self.upstream.cancel_all();
    }

    /// Get the response cache.
    #[inline]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Get a read-only view of the response cache.
    pub fn cache_view(&self) -> ReadOnlyCache {
        self.cache.read_only()
    }

    /// Number of live downstream watches.
    pub fn watch_count(&self) -> usize {
        self.downstream.len()
    }

    /// Number of live upstream subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.upstream.len()
    }

    /// Open the upstream subscription for a key unless one exists.
    fn ensure_subscription(&self, key: &AggregatedKey, request: &DiscoveryRequest) {
        if self.upstream.contains(key) {
            return;
        }

        // Opened outside the registry lock so connects do not serialize.
        let receiver = self.upstream_client.open_stream(request.clone());
        let subscription = Subscription {
            id: SubscriptionId::next(),
            cancel: self.root.child_token(),
        };
        let id = subscription.id;
        let token = subscription.cancel.clone();

        if !self.upstream.try_insert(key, subscription) {
            // Lost the race; dropping the receiver closes the extra stream.
            debug!(key = %key, "subscription already present, dropping extra stream");
            return;
        }
        info!(key = %key, subscription = %id, "opened upstream subscription");

        let task = FanoutTask {
            key: key.clone(),
            subscription: id,
            cache: Arc::clone(&self.cache),
            downstream: Arc::clone(&self.downstream),
            upstream: Arc::clone(&self.upstream),
            mode: self.delivery_mode,
        };
        tokio::spawn(task.run(receiver, token));
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("watches", &self.downstream.len())
            .field("subscriptions", &self.upstream.len())
            .field("delivery_mode", &self.delivery_mode)
            .finish_non_exhaustive()
    }
}

/// Idempotent handle withdrawing one watch.
///
/// Removes the watch from the downstream registry and detaches it from its
/// key's request set. Never tears down the upstream subscription.
#[derive(Debug)]
pub struct CancelWatch {
    key: AggregatedKey,
    id: WatchId,
    cache: Arc<ResponseCache>,
    downstream: Arc<DownstreamMap>,
}

impl CancelWatch {
    /// Withdraw the watch. Safe to call more than once.
    pub fn cancel(&self) {
        self.downstream.unregister(self.id);
        self.cache.delete_request(&self.key, self.id);
    }

    /// Identity of the watch this handle cancels.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WatchId {
        self.id
    }
}

/// One fan-out loop, owning the receiving end of one upstream stream.
struct FanoutTask {
    key: AggregatedKey,
    subscription: SubscriptionId,
    cache: Arc<ResponseCache>,
    downstream: Arc<DownstreamMap>,
    upstream: Arc<UpstreamMap>,
    mode: DeliveryMode,
}

impl FanoutTask {
    async fn run(
        self,
        mut receiver: mpsc::Receiver<DiscoveryResponse>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(key = %self.key, subscription = %self.subscription, "fan-out cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Some(response) => self.dispatch(response),
                    None => {
                        info!(key = %self.key, subscription = %self.subscription, "upstream stream closed");
                        self.upstream.remove_if(&self.key, self.subscription);
                        break;
                    }
                },
            }
        }
    }

    /// Store one upstream response and deliver it to every attached watch.
    fn dispatch(&self, response: DiscoveryResponse) {
        let response = Arc::new(response);
        let watchers = self.cache.set_response(&self.key, Arc::clone(&response));

        let mut delivered = 0usize;
        for watch in watchers {
            if deliver_to_watch(
                &self.cache,
                &self.downstream,
                self.mode,
                &self.key,
                watch,
                &response,
            ) {
                delivered += 1;
            }
        }
        debug!(
            key = %self.key,
            version = %response.version_info,
            delivered,
            "fanned out response"
        );
    }
}

/// Deliver one response to one watch; returns whether it was accepted.
///
/// Under single-shot delivery an accepted response detaches the watch from
/// its key. A closed channel detaches the watch either way; a full channel
/// drops the response and keeps the watch attached for the next version.
fn deliver_to_watch(
    cache: &ResponseCache,
    downstream: &DownstreamMap,
    mode: DeliveryMode,
    key: &AggregatedKey,
    watch: WatchId,
    response: &Arc<DiscoveryResponse>,
) -> bool {
    let Some(sender) = downstream.sender(watch) else {
        return false;
    };
    match sender.try_send(Arc::clone(response)) {
        Ok(()) => {
            if mode.is_single_shot() {
                cache.delete_request(key, watch);
            }
            true
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(key = %key, watch = %watch, "watch channel full, dropping response");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(key = %key, watch = %watch, "watch channel closed, detaching");
            downstream.unregister(watch);
            cache.delete_request(key, watch);
            false
        }
    }
}

/// Builder for a configured [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    mapper: Option<Arc<dyn Mapper>>,
    upstream_client: Option<Arc<dyn UpstreamClient>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mapper: None,
            upstream_client: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Set the mapper computing aggregated keys.
    #[must_use]
    pub fn mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// Set the upstream client opening configuration streams.
    #[must_use]
    pub fn upstream_client(mut self, client: impl UpstreamClient + 'static) -> Self {
        self.upstream_client = Some(Arc::new(client));
        self
    }

    /// Set the orchestrator configuration.
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator.
    ///
    /// Wires the cache eviction callback to the upstream registry: an
    /// evicted key's subscription is cancelled from inside the eviction,
    /// without the callback ever re-entering the cache.
    pub fn build(self) -> Result<Orchestrator> {
        let mapper = self.mapper.ok_or_else(|| RelayError::InvalidConfig {
            reason: "orchestrator requires a mapper".to_string(),
        })?;
        let upstream_client = self.upstream_client.ok_or_else(|| RelayError::InvalidConfig {
            reason: "orchestrator requires an upstream client".to_string(),
        })?;

        let upstream = Arc::new(UpstreamMap::new());
        let on_evict = {
            let upstream = Arc::clone(&upstream);
            move |key: &AggregatedKey, _entry: &relay_cache::CacheEntry| {
                // Runs while the cache lock is held; only the upstream
                // registry may be touched here.
                if upstream.remove(key) {
                    debug!(key = %key, "evicted key, upstream subscription cancelled");
                }
            }
        };
        let cache = Arc::new(
            ResponseCache::builder()
                .max_entries(self.config.cache_max_entries)
                .ttl(self.config.cache_ttl)
                .on_evict(Box::new(on_evict))
                .build(),
        );

        Ok(Orchestrator {
            mapper,
            upstream_client,
            cache,
            downstream: Arc::new(DownstreamMap::new()),
            upstream,
            delivery_mode: self.config.delivery_mode,
            root: CancellationToken::new(),
        })
    }
}

impl fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
