//! The response cache.
//!
//! Keeps the most recent upstream response per aggregated key, together with
//! the set of downstream watches waiting on that key. Capacity is bounded by
//! LRU order; expiry is a lazy TTL realized on `fetch`.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use lru::LruCache;
use relay_core::{AggregatedKey, DiscoveryResponse, RelayError, Result, WatchId};
use tracing::{debug, trace};

use crate::stats::CacheStats;

const LOCK_POISONED: &str = "cache lock poisoned";

/// Callback invoked exactly once per evicted entry, capacity or TTL.
///
/// Runs synchronously while the cache lock is held; it must not call back
/// into the cache.
pub type EvictionCallback = Box<dyn Fn(&AggregatedKey, &CacheEntry) + Send + Sync>;

/// One cache entry: the latest response for a key plus the watches waiting
/// on it.
///
/// The request set holds [`WatchId`]s only; the channels those ids resolve
/// to are owned by the downstream registry.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// Most recent response for the key, if any has arrived.
    pub response: Option<Arc<DiscoveryResponse>>,
    /// Watches attached to the key and not yet served.
    pub requests: HashSet<WatchId>,
    /// Instant at which the entry goes stale; `None` means never.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    /// Whether the entry's deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

type Store = LruCache<AggregatedKey, CacheEntry>;

/// Bounded, TTL-expiring cache of upstream responses keyed by aggregated key.
///
/// ## Semantics
///
/// - `fetch` never extends an entry's lifetime; it is also the only
///   operation that realizes TTL expiry (lazy eviction)
/// - `set_response` is the only operation that resets a live entry's
///   deadline
/// - capacity eviction is LRU; recency is recorded by `add_request`,
///   `set_response`, and successful `fetch`
/// - every removal fires the eviction callback exactly once
///
/// ## Thread Safety
///
/// All operations take the internal lock for a short, I/O-free section and
/// are safe to call from any thread or task.
pub struct ResponseCache {
    inner: RwLock<Store>,
    ttl: Duration,
    on_evict: EvictionCallback,
    stats: CacheStats,
}

impl ResponseCache {
    /// Create a cache with no eviction callback.
    ///
    /// `max_entries == 0` means unbounded; `ttl == Duration::ZERO` disables
    /// expiration.
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self::builder().max_entries(max_entries).ttl(ttl).build()
    }

    /// Create a builder for a configured cache.
    #[must_use]
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    /// Create a cache from external configuration.
    ///
    /// Rejects a negative TTL with [`RelayError::InvalidConfig`].
    pub fn from_config(config: &CacheConfig, on_evict: EvictionCallback) -> Result<Self> {
        if config.ttl_secs < 0 {
            return Err(RelayError::InvalidConfig {
                reason: format!(
                    "ttl must be nonnegative but was set to {}s",
                    config.ttl_secs
                ),
            });
        }
        Ok(Self::builder()
            .max_entries(config.max_entries)
            .ttl(Duration::from_secs(config.ttl_secs.unsigned_abs()))
            .on_evict(on_evict)
            .build())
    }

    /// Get the current entry for a key.
    ///
    /// Does not refresh the TTL deadline. An entry whose deadline has passed
    /// is removed here, fires the eviction callback, and reports as a miss.
    pub fn fetch(&self, key: &AggregatedKey) -> Result<CacheEntry> {
        // Misses return under the shared lock; hits and expiries both mutate
        // (recency, removal) and take the exclusive lock below.
        {
            let inner = self.inner.read().expect(LOCK_POISONED);
            if inner.peek(key).is_none() {
                self.stats.record_miss();
                trace!(key = %key, "cache miss");
                return Err(RelayError::NotFound { key: key.clone() });
            }
        }

        let mut inner = self.inner.write().expect(LOCK_POISONED);
        let now = Instant::now();
        // Expiry is decided under the exclusive lock: a concurrent
        // set_response since the shared-lock check may have extended the
        // deadline, and a concurrent fetch may already have reaped the entry.
        match inner.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.stats.record_hit();
                trace!(key = %key, "cache hit");
                return Ok(entry.clone());
            }
            None => {
                self.stats.record_miss();
                trace!(key = %key, "cache miss");
                return Err(RelayError::NotFound { key: key.clone() });
            }
            Some(_) => {}
        }

        if let Some(entry) = inner.pop(key) {
            debug!(key = %key, "entry expired");
            self.notify_evicted(key, &entry);
        }
        self.stats.record_miss();
        Err(RelayError::NotFound { key: key.clone() })
    }

    /// Store the latest response for a key and return the watches to notify.
    ///
    /// Creates the entry if absent (returning an empty set) and resets the
    /// deadline either way; this is the only call that extends a live
    /// entry's lifetime, and it does so even for an entry whose deadline has
    /// already passed but which has not yet been reaped.
    pub fn set_response(
        &self,
        key: &AggregatedKey,
        response: Arc<DiscoveryResponse>,
    ) -> HashSet<WatchId> {
        let now = Instant::now();
        debug!(key = %key, version = %response.version_info, "caching response");

        let mut inner = self.inner.write().expect(LOCK_POISONED);
        if let Some(entry) = inner.get_mut(key) {
            entry.response = Some(response);
            entry.expires_at = self.deadline(now);
            self.stats.record_set();
            return entry.requests.clone();
        }

        let entry = CacheEntry {
            response: Some(response),
            requests: HashSet::new(),
            expires_at: self.deadline(now),
        };
        self.insert_new(&mut inner, key, entry);
        self.stats.record_set();
        HashSet::new()
    }

    /// Attach a watch to a key, creating the entry if absent.
    ///
    /// Idempotent for the same id. The deadline is set on initial creation
    /// only; attaching to an existing entry records recency but does not
    /// extend its lifetime.
    pub fn add_request(&self, key: &AggregatedKey, id: WatchId) {
        let mut inner = self.inner.write().expect(LOCK_POISONED);
        if let Some(entry) = inner.get_mut(key) {
            entry.requests.insert(id);
            trace!(key = %key, watch = %id, "attached request");
            return;
        }

        let entry = CacheEntry {
            response: None,
            requests: HashSet::from([id]),
            expires_at: self.deadline(Instant::now()),
        };
        self.insert_new(&mut inner, key, entry);
        trace!(key = %key, watch = %id, "attached request to new entry");
    }

    /// Detach a watch from a key.
    ///
    /// A missing key or id is a no-op. The entry stays in the cache even
    /// when its request set becomes empty, and its recency is untouched.
    pub fn delete_request(&self, key: &AggregatedKey, id: WatchId) {
        let mut inner = self.inner.write().expect(LOCK_POISONED);
        if let Some(entry) = inner.peek_mut(key) {
            if entry.requests.remove(&id) {
                trace!(key = %key, watch = %id, "detached request");
            }
        }
    }

    /// Get a cloneable read-only view for introspection.
    pub fn read_only(self: &Arc<Self>) -> ReadOnlyCache {
        ReadOnlyCache {
            cache: Arc::clone(self),
        }
    }

    /// Get cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of entries currently held, expired-but-unreaped included.
    pub fn len(&self) -> usize {
        self.inner.read().expect(LOCK_POISONED).len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deadline(&self, now: Instant) -> Option<Instant> {
        if self.ttl > Duration::ZERO {
            Some(now + self.ttl)
        } else {
            None
        }
    }

    /// Insert an entry for a key known to be absent; a displaced LRU entry
    /// fires the eviction callback.
    fn insert_new(&self, inner: &mut Store, key: &AggregatedKey, entry: CacheEntry) {
        if let Some((evicted_key, evicted)) = inner.push(key.clone(), entry) {
            if evicted_key != *key {
                debug!(key = %evicted_key, "entry displaced by capacity");
                self.notify_evicted(&evicted_key, &evicted);
            }
        }
    }

    fn notify_evicted(&self, key: &AggregatedKey, entry: &CacheEntry) {
        self.stats.record_eviction();
        (self.on_evict)(key, entry);
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a [`ResponseCache`].
///
/// Exposes lookups only; holders cannot attach requests or store responses.
#[derive(Clone)]
pub struct ReadOnlyCache {
    cache: Arc<ResponseCache>,
}

impl ReadOnlyCache {
    /// Get a value copy of the current entry for a key.
    pub fn fetch(&self, key: &AggregatedKey) -> Result<CacheEntry> {
        self.cache.fetch(key)
    }

    /// Get cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// External configuration for the cache.
///
/// The TTL arrives from configuration as signed seconds so that a negative
/// value can be rejected instead of silently wrapping.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU displacement; zero means
    /// unbounded.
    pub max_entries: usize,
    /// Entry lifetime in seconds; zero disables expiration.
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 4096,
            ttl_secs: 12 * 60 * 60,
        }
    }
}

/// Builder for a configured [`ResponseCache`].
pub struct CacheBuilder {
    max_entries: usize,
    ttl: Duration,
    on_evict: Option<EvictionCallback>,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBuilder {
    /// Create a new cache builder: unbounded, no expiration, no callback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_entries: 0,
            ttl: Duration::ZERO,
            on_evict: None,
        }
    }

    /// Set the entry bound; zero means unbounded.
    #[must_use]
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the entry lifetime; zero disables expiration.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the eviction callback.
    #[must_use]
    pub fn on_evict(mut self, on_evict: EvictionCallback) -> Self {
        self.on_evict = Some(on_evict);
        self
    }

    /// Build the cache.
    #[must_use]
    pub fn build(self) -> ResponseCache {
        let store = match NonZeroUsize::new(self.max_entries) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        ResponseCache {
            inner: RwLock::new(store),
            ttl: self.ttl,
            on_evict: self.on_evict.unwrap_or_else(|| Box::new(|_, _| {})),
            stats: CacheStats::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    const KEY_A: &str = "key_A";
    const KEY_B: &str = "key_B";

    fn response(version: &str) -> Arc<DiscoveryResponse> {
        Arc::new(DiscoveryResponse::new(
            version,
            "type.googleapis.com/envoy.api.v2.Listener",
            vec![bytes::Bytes::from_static(b"test")],
        ))
    }

    /// Cache whose evictions are recorded for assertion.
    fn recording_cache(
        max_entries: usize,
        ttl: Duration,
    ) -> (ResponseCache, Arc<Mutex<Vec<AggregatedKey>>>) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&evicted);
        let cache = ResponseCache::builder()
            .max_entries(max_entries)
            .ttl(ttl)
            .on_evict(Box::new(move |key, _entry| {
                log.lock().unwrap().push(key.clone());
            }))
            .build();
        (cache, evicted)
    }

    #[test]
    fn add_request_and_fetch() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);

        let err = cache.fetch(&key).unwrap_err();
        assert_eq!(err.to_string(), "no value found for key: key_A");

        cache.add_request(&key, WatchId::next());

        let entry = cache.fetch(&key).unwrap();
        assert!(entry.response.is_none());
        assert_eq!(entry.requests.len(), 1);
    }

    #[test]
    fn set_response_and_fetch() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);

        assert!(cache.fetch(&key).is_err());

        let watchers = cache.set_response(&key, response("version_A"));
        assert!(watchers.is_empty());

        let entry = cache.fetch(&key).unwrap();
        assert_eq!(
            entry.response.as_deref().map(|r| r.version_info.as_str()),
            Some("version_A")
        );
    }

    #[test]
    fn set_response_returns_attached_requests() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);
        let first = WatchId::next();
        let second = WatchId::next();

        cache.add_request(&key, first);
        cache.add_request(&key, second);

        let watchers = cache.set_response(&key, response("version_A"));
        assert_eq!(watchers.len(), 2);
        assert!(watchers.contains(&first));
        assert!(watchers.contains(&second));
    }

    #[test]
    fn add_request_idempotent() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);
        let id = WatchId::next();

        cache.add_request(&key, id);
        cache.add_request(&key, id);

        let watchers = cache.set_response(&key, response("version_A"));
        assert_eq!(watchers.len(), 1);
    }

    #[test]
    fn delete_request_detaches_but_keeps_entry() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);
        let id = WatchId::next();

        cache.add_request(&key, id);
        cache.delete_request(&key, id);

        let watchers = cache.set_response(&key, response("version_A"));
        assert!(watchers.is_empty());
        assert!(cache.fetch(&key).is_ok());
    }

    #[test]
    fn delete_request_missing_is_noop() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);
        let other = AggregatedKey::new(KEY_B);
        let id = WatchId::next();

        // Missing key.
        cache.delete_request(&other, id);

        // Present key, missing handle.
        cache.add_request(&key, id);
        cache.delete_request(&key, WatchId::next());

        let entry = cache.fetch(&key).unwrap();
        assert_eq!(entry.requests.len(), 1);
    }

    #[test]
    fn capacity_eviction_fires_callback_once() {
        let (cache, evicted) = recording_cache(1, Duration::from_secs(60));
        let key_a = AggregatedKey::new(KEY_A);
        let key_b = AggregatedKey::new(KEY_B);

        cache.set_response(&key_a, response("version_A"));
        assert!(cache.fetch(&key_a).is_ok());

        cache.add_request(&key_b, WatchId::next());
        assert_eq!(evicted.lock().unwrap().as_slice(), &[key_a.clone()]);

        assert!(cache.fetch(&key_a).is_err());
        let entry = cache.fetch(&key_b).unwrap();
        assert!(entry.response.is_none());
    }

    #[test]
    fn updating_existing_key_is_not_an_eviction() {
        let (cache, evicted) = recording_cache(1, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);

        cache.set_response(&key, response("1"));
        cache.set_response(&key, response("2"));

        assert!(evicted.lock().unwrap().is_empty());
        let entry = cache.fetch(&key).unwrap();
        assert_eq!(
            entry.response.as_deref().map(|r| r.version_info.as_str()),
            Some("2")
        );
    }

    #[test]
    fn ttl_expiry_is_lazy_and_fires_callback_once() {
        let (cache, evicted) = recording_cache(1, Duration::from_millis(10));
        let key = AggregatedKey::new(KEY_A);

        cache.set_response(&key, response("version_A"));
        assert!(cache.fetch(&key).is_ok());

        thread::sleep(Duration::from_millis(15));

        // Still present until a fetch realizes the expiry.
        assert_eq!(cache.len(), 1);
        assert!(evicted.lock().unwrap().is_empty());

        let err = cache.fetch(&key).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(evicted.lock().unwrap().as_slice(), &[key.clone()]);

        // Second miss is plain; the callback does not fire again.
        assert!(cache.fetch(&key).is_err());
        assert_eq!(evicted.lock().unwrap().len(), 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn ttl_disabled_never_expires() {
        let cache = ResponseCache::new(1, Duration::ZERO);
        let key = AggregatedKey::new(KEY_A);

        cache.set_response(&key, response("version_A"));
        thread::sleep(Duration::from_millis(5));

        let entry = cache.fetch(&key).unwrap();
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn negative_ttl_rejected() {
        let config = CacheConfig {
            max_entries: 1,
            ttl_secs: -1,
        };
        let err = ResponseCache::from_config(&config, Box::new(|_, _| {})).unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig { .. }));
        assert_eq!(
            err.to_string(),
            "invalid configuration: ttl must be nonnegative but was set to -1s"
        );
    }

    #[test]
    fn from_config_builds() {
        let config = CacheConfig::default();
        let cache = ResponseCache::from_config(&config, Box::new(|_, _| {})).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn set_response_resurrects_expired_entry() {
        let (cache, evicted) = recording_cache(1, Duration::from_millis(10));
        let key = AggregatedKey::new(KEY_A);

        cache.set_response(&key, response("1"));
        thread::sleep(Duration::from_millis(15));

        // The entry is past its deadline but unreaped; a new response
        // extends the deadline instead of being lost to eviction.
        cache.set_response(&key, response("2"));

        let entry = cache.fetch(&key).unwrap();
        assert_eq!(
            entry.response.as_deref().map(|r| r.version_info.as_str()),
            Some("2")
        );
        assert!(evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn fetch_records_lru_recency() {
        let (cache, evicted) = recording_cache(2, Duration::ZERO);
        let key_a = AggregatedKey::new(KEY_A);
        let key_b = AggregatedKey::new(KEY_B);
        let key_c = AggregatedKey::new("key_C");

        cache.set_response(&key_a, response("1"));
        cache.set_response(&key_b, response("1"));

        // Touch A so B is the least recently used.
        assert!(cache.fetch(&key_a).is_ok());

        cache.add_request(&key_c, WatchId::next());
        assert_eq!(evicted.lock().unwrap().as_slice(), &[key_b]);
        assert!(cache.fetch(&key_a).is_ok());
    }

    #[test]
    fn entry_expiry() {
        let now = Instant::now();
        let mut entry = CacheEntry::default();

        assert!(!entry.is_expired(now));

        entry.expires_at = Some(now);
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + Duration::from_nanos(1)));
    }

    #[test]
    fn read_only_view_fetches() {
        let cache = Arc::new(ResponseCache::new(1, Duration::from_secs(60)));
        let key = AggregatedKey::new(KEY_A);

        cache.set_response(&key, response("version_A"));

        let view = cache.read_only();
        let entry = view.fetch(&key).unwrap();
        assert!(entry.response.is_some());
        assert_eq!(view.len(), 1);

        let cloned = view.clone();
        assert!(cloned.fetch(&key).is_ok());
    }

    #[test]
    fn stats_track_operations() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        let key = AggregatedKey::new(KEY_A);

        assert!(cache.fetch(&key).is_err());
        cache.set_response(&key, response("1"));
        assert!(cache.fetch(&key).is_ok());

        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().sets(), 1);
        assert_eq!(cache.stats().hits(), 1);
    }
}
