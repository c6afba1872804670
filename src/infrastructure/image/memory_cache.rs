//! In-memory LRU image cache with byte/entry budgets and single-flight fills.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::domain::entities::ImagePayload;
use crate::domain::errors::RawFetchFailure;

/// Default byte budget (64 MiB of decoded pixels).
pub const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;

/// Default maximum number of cached images.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

type FillResult = Result<ImagePayload, RawFetchFailure>;
type FillReceiver = watch::Receiver<Option<FillResult>>;

/// Cache budgets. Both are enforced independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum decoded bytes held.
    pub max_bytes: usize,
    /// Maximum number of entries held.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

struct StoredEntry {
    payload: ImagePayload,
    last_access: Instant,
    in_use: usize,
}

impl StoredEntry {
    fn snapshot(&self, key: &str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            payload: self.payload.clone(),
            size: self.payload.byte_size(),
            last_access: self.last_access,
            in_use: self.in_use > 0,
        }
    }
}

struct CacheState {
    entries: LruCache<String, StoredEntry>,
    total_bytes: usize,
}

/// Point-in-time view of a cached image.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Resolved URL.
    pub key: String,
    /// Decoded image.
    pub payload: ImagePayload,
    /// Decoded size in bytes.
    pub size: usize,
    /// Last read or write.
    pub last_access: Instant,
    /// Whether a render currently holds a lease on it.
    pub in_use: bool,
}

/// Bounded image cache shared by on-demand loads and prefetch.
///
/// Recency is tracked by the LRU order; every read or write promotes the
/// entry. Entries with live [`CacheLease`]s are never evicted.
pub struct ImageCache {
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<String, FillReceiver>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ImageCache {
    /// Creates a cache with the given budgets. Zero budgets are raised to 1.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            max_bytes: config.max_bytes.max(1),
            max_entries: config.max_entries.max(1),
        };
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            inflight: Mutex::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a cache with the default budgets.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Effective budgets.
    #[must_use]
    pub const fn config(&self) -> CacheConfig {
        self.config
    }

    /// Reads an entry, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = Instant::now();
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Image cache hit");
            Some(entry.snapshot(key))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Image cache miss");
            None
        }
    }

    /// Reads an entry without promoting it in the LRU.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        let state = self.state.lock();
        state.entries.peek(key).map(|entry| entry.snapshot(key))
    }

    /// Returns true if `key` is cached. Does not touch recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Stores a payload. Re-inserting identical content only refreshes recency.
    pub fn put(&self, key: &str, payload: ImagePayload) {
        let mut state = self.state.lock();
        let now = Instant::now();
        {
            let CacheState {
                entries,
                total_bytes,
            } = &mut *state;

            if let Some(entry) = entries.get_mut(key) {
                entry.last_access = now;
                if !entry.payload.same_content(&payload) {
                    *total_bytes =
                        total_bytes.saturating_sub(entry.payload.byte_size()) + payload.byte_size();
                    entry.payload = payload;
                    debug!(key, "Replaced cached image");
                }
            } else {
                *total_bytes += payload.byte_size();
                debug!(key, bytes = payload.byte_size(), "Storing image in cache");
                entries.put(
                    key.to_string(),
                    StoredEntry {
                        payload,
                        last_access: now,
                        in_use: 0,
                    },
                );
            }
        }
        self.evict_locked(&mut state);
    }

    /// Evicts least-recently-used, not-in-use entries until within budget.
    /// Returns the number of evicted entries.
    pub fn evict_if_needed(&self) -> usize {
        let mut state = self.state.lock();
        self.evict_locked(&mut state)
    }

    fn evict_locked(&self, state: &mut CacheState) -> usize {
        let mut evicted = 0;
        while state.total_bytes > self.config.max_bytes
            || state.entries.len() > self.config.max_entries
        {
            let victim = state
                .entries
                .iter()
                .rev()
                .find(|(_, entry)| entry.in_use == 0)
                .map(|(key, _)| key.clone());

            let Some(key) = victim else {
                trace!(
                    bytes = state.total_bytes,
                    entries = state.entries.len(),
                    "Cache over budget, all entries in use"
                );
                break;
            };

            if let Some(entry) = state.entries.pop(&key) {
                state.total_bytes = state.total_bytes.saturating_sub(entry.payload.byte_size());
                evicted += 1;
                debug!(key = %key, bytes = entry.payload.byte_size(), "Evicted image from cache");
            }
        }
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Pins an entry for rendering. The entry stays cached until the lease drops.
    pub fn acquire(self: &Arc<Self>, key: &str) -> Option<CacheLease> {
        let lease = self.pin(key);
        if lease.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Image cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Image cache miss");
        }
        lease
    }

    fn pin(self: &Arc<Self>, key: &str) -> Option<CacheLease> {
        let payload = {
            let mut state = self.state.lock();
            let entry = state.entries.get_mut(key)?;
            entry.in_use += 1;
            entry.last_access = Instant::now();
            entry.payload.clone()
        };
        Some(CacheLease {
            key: key.to_string(),
            payload,
            cache: Some(Arc::clone(self)),
        })
    }

    fn release(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.peek_mut(key) {
            entry.in_use = entry.in_use.saturating_sub(1);
        }
        self.evict_locked(&mut state);
    }

    /// Removes an entry unless it is in use. Returns true if removed.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if state.entries.peek(key).is_some_and(|entry| entry.in_use > 0) {
            return false;
        }
        match state.entries.pop(key) {
            Some(entry) => {
                state.total_bytes = state.total_bytes.saturating_sub(entry.payload.byte_size());
                debug!(key, "Removed image from cache");
                true
            }
            None => false,
        }
    }

    /// Drops every entry that is not in use.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.in_use == 0)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(entry) = state.entries.pop(key) {
                state.total_bytes = state.total_bytes.saturating_sub(entry.payload.byte_size());
            }
        }
        info!(
            cleared = keys.len(),
            retained = state.entries.len(),
            "Cleared image cache"
        );
    }

    /// Returns a pinned entry, filling it through `fill` on a miss.
    ///
    /// Concurrent callers for the same key share one fill. The fill runs on
    /// its own task, so a caller that stops waiting neither cancels it nor
    /// strands the other waiters; a successful result is cached either way.
    ///
    /// # Errors
    /// Returns the fill's failure. Failures are not cached.
    pub async fn get_or_fill<F>(self: &Arc<Self>, key: &str, fill: F) -> FillResultLease
    where
        F: Future<Output = FillResult> + Send + 'static,
    {
        if let Some(lease) = self.acquire(key) {
            return Ok(lease);
        }

        let mut rx = self.join_or_start(key, fill);
        let payload = wait_for_fill(&mut rx).await?;

        Ok(self
            .pin(key)
            .unwrap_or_else(|| CacheLease::detached(key, payload)))
    }

    fn join_or_start<F>(self: &Arc<Self>, key: &str, fill: F) -> FillReceiver
    where
        F: Future<Output = FillResult> + Send + 'static,
    {
        let mut inflight = self.inflight.lock();
        if let Some(rx) = inflight.get(key) {
            trace!(key, "Joining in-flight fill");
            return rx.clone();
        }

        // A fill that completed since the caller's miss has already stored its payload.
        if let Some(entry) = self.peek(key) {
            let (_tx, rx) = watch::channel(Some(Ok(entry.payload)));
            return rx;
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(key.to_string(), rx.clone());
        drop(inflight);

        let guard = InflightGuard {
            cache: Arc::clone(self),
            key: key.to_string(),
        };
        tokio::spawn(async move {
            let result = fill.await;
            if let Ok(payload) = &result {
                guard.cache.put(&guard.key, payload.clone());
            }
            drop(guard);
            let _ = tx.send(Some(result));
        });

        rx
    }

    /// Returns true while a fill for `key` is running.
    #[must_use]
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inflight.lock().contains_key(key)
    }

    /// Number of fills running.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded bytes currently held.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let (entries, bytes) = {
            let state = self.state.lock();
            (state.entries.len(), state.total_bytes)
        };
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
            entries,
            bytes,
        }
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Result of [`ImageCache::get_or_fill`].
pub type FillResultLease = Result<CacheLease, RawFetchFailure>;

async fn wait_for_fill(rx: &mut FillReceiver) -> FillResult {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(result) = current {
            return result;
        }
        if rx.changed().await.is_err() {
            // Fill task died without publishing.
            let last = rx.borrow().clone();
            return last.unwrap_or(Err(RawFetchFailure::Cancelled));
        }
    }
}

/// Removes the in-flight marker even if the fill task panics.
struct InflightGuard {
    cache: Arc<ImageCache>,
    key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.cache.inflight.lock().remove(&self.key);
    }
}

/// Keeps a cached image in use while a render displays it.
pub struct CacheLease {
    key: String,
    payload: ImagePayload,
    cache: Option<Arc<ImageCache>>,
}

impl CacheLease {
    /// Lease for a payload that never made it into the cache (over budget).
    fn detached(key: &str, payload: ImagePayload) -> Self {
        Self {
            key: key.to_string(),
            payload,
            cache: None,
        }
    }

    /// Cache key (the image URL).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Decoded image.
    #[must_use]
    pub const fn payload(&self) -> &ImagePayload {
        &self.payload
    }

    /// Returns true if the lease holds a pin on a cache entry.
    #[must_use]
    pub const fn is_pinned(&self) -> bool {
        self.cache.is_some()
    }
}

impl Clone for CacheLease {
    fn clone(&self) -> Self {
        self.cache
            .as_ref()
            .and_then(|cache| cache.pin(&self.key))
            .unwrap_or_else(|| Self::detached(&self.key, self.payload.clone()))
    }
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.take() {
            cache.release(&self.key);
        }
    }
}

impl std::fmt::Debug for CacheLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLease")
            .field("key", &self.key)
            .field("payload", &self.payload)
            .field("pinned", &self.is_pinned())
            .finish()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted by the budget.
    pub evictions: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub entries: usize,
    /// Current decoded bytes held.
    pub bytes: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.entries, self.bytes, self.hit_rate, self.hits, self.misses, self.evictions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn payload(width: u32, height: u32) -> ImagePayload {
        ImagePayload::from_image(image::DynamicImage::new_rgb8(width, height))
    }

    fn cache(max_bytes: usize, max_entries: usize) -> Arc<ImageCache> {
        Arc::new(ImageCache::new(CacheConfig {
            max_bytes,
            max_entries,
        }))
    }

    fn counting_fill(
        counter: &Arc<AtomicUsize>,
        delay: Duration,
        result: FillResult,
    ) -> impl Future<Output = FillResult> + Send + use<> {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            result
        }
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = ImageCache::with_defaults();
        cache.put("a", payload(10, 10));

        let entry = cache.get("a").unwrap();
        assert_eq!(entry.size, 300);
        assert_eq!(entry.payload.width(), 10);
        assert!(!entry.in_use);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ImageCache::with_defaults();
        assert!(cache.get("nonexistent").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_entry_budget_evicts_least_recent() {
        let cache = ImageCache::new(CacheConfig {
            max_bytes: DEFAULT_MAX_BYTES,
            max_entries: 2,
        });

        cache.put("a", payload(10, 10));
        cache.put("b", payload(10, 10));
        let _ = cache.get("a");
        cache.put("c", payload(10, 10));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_byte_budget_evicts_least_recent() {
        let cache = ImageCache::new(CacheConfig {
            max_bytes: 700,
            max_entries: 10,
        });

        cache.put("a", payload(10, 10));
        cache.put("b", payload(10, 10));
        let _ = cache.get("a");
        cache.put("c", payload(10, 10));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.total_bytes(), 600);
    }

    #[test]
    fn test_in_use_entry_is_never_evicted() {
        let cache = cache(DEFAULT_MAX_BYTES, 2);

        cache.put("a", payload(10, 10));
        let lease = cache.acquire("a").unwrap();
        cache.put("b", payload(10, 10));
        cache.put("c", payload(10, 10));

        // "a" is least recent but pinned, so "b" goes instead.
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.peek("a").unwrap().in_use);

        drop(lease);
        assert!(!cache.peek("a").unwrap().in_use);

        cache.put("d", payload(10, 10));
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_put_is_idempotent() {
        let cache = ImageCache::with_defaults();
        let first = payload(10, 10);

        cache.put("a", first.clone());
        cache.put("a", first);
        cache.put("a", payload(10, 10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 300);

        cache.put("a", payload(20, 10));
        assert_eq!(cache.total_bytes(), 600);
        assert_eq!(cache.get("a").unwrap().size, 600);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = ImageCache::new(CacheConfig {
            max_bytes: DEFAULT_MAX_BYTES,
            max_entries: 2,
        });

        cache.put("a", payload(10, 10));
        cache.put("b", payload(10, 10));
        let _ = cache.peek("a");
        cache.put("c", payload(10, 10));

        assert!(cache.peek("a").is_none());
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_remove_and_clear_skip_in_use() {
        let cache = cache(DEFAULT_MAX_BYTES, 10);
        cache.put("a", payload(10, 10));
        cache.put("b", payload(10, 10));
        cache.put("c", payload(10, 10));
        let lease = cache.acquire("a").unwrap();

        assert!(!cache.remove("a"));
        assert!(cache.remove("b"));
        assert!(!cache.remove("b"));

        cache.clear();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("a"));
        assert_eq!(cache.total_bytes(), 300);

        drop(lease);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = ImageCache::with_defaults();
        cache.put("a", payload(10, 10));

        let _ = cache.get("a");
        let _ = cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!(stats.to_string().contains("50.0% hit rate"));
    }

    #[tokio::test]
    async fn test_concurrent_fills_share_one_fetch() {
        let cache = cache(DEFAULT_MAX_BYTES, 10);
        let fills = Arc::new(AtomicUsize::new(0));

        let requests = (0..8).map(|_| {
            cache.get_or_fill(
                "k",
                counting_fill(&fills, Duration::from_millis(20), Ok(payload(4, 4))),
            )
        });
        let results = futures_util::future::join_all(requests).await;

        assert_eq!(fills.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(Result::is_ok));
        assert!(cache.contains("k"));
        assert!(!cache.is_in_flight("k"));
    }

    #[tokio::test]
    async fn test_failed_fill_is_not_cached() {
        let cache = cache(DEFAULT_MAX_BYTES, 10);
        let fills = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_fill(
                "k",
                counting_fill(&fills, Duration::ZERO, Err(RawFetchFailure::status(404))),
            )
            .await;
        assert_eq!(first.unwrap_err(), RawFetchFailure::status(404));
        assert!(!cache.contains("k"));
        assert_eq!(cache.in_flight_count(), 0);

        let second = cache
            .get_or_fill("k", counting_fill(&fills, Duration::ZERO, Ok(payload(4, 4))))
            .await;
        assert!(second.is_ok());
        assert_eq!(fills.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_caller_does_not_cancel_fill() {
        let cache = cache(DEFAULT_MAX_BYTES, 10);
        let fills = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            cache.get_or_fill(
                "k",
                counting_fill(&fills, Duration::from_millis(50), Ok(payload(4, 4))),
            ),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(cache.is_in_flight("k"));

        let joined = cache
            .get_or_fill(
                "k",
                counting_fill(&fills, Duration::ZERO, Err(RawFetchFailure::Timeout)),
            )
            .await;

        assert!(joined.is_ok());
        assert_eq!(fills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lease_pins_until_dropped() {
        let cache = cache(DEFAULT_MAX_BYTES, 10);
        let fills = Arc::new(AtomicUsize::new(0));

        let lease = cache
            .get_or_fill("k", counting_fill(&fills, Duration::ZERO, Ok(payload(4, 4))))
            .await
            .unwrap();
        assert!(lease.is_pinned());
        assert!(cache.peek("k").unwrap().in_use);

        let second = lease.clone();
        drop(lease);
        assert!(cache.peek("k").unwrap().in_use);

        drop(second);
        assert!(!cache.peek("k").unwrap().in_use);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_returned_detached() {
        let cache = cache(100, 10);
        let fills = Arc::new(AtomicUsize::new(0));

        let lease = cache
            .get_or_fill("big", counting_fill(&fills, Duration::ZERO, Ok(payload(10, 10))))
            .await
            .unwrap();

        assert!(!lease.is_pinned());
        assert_eq!(lease.payload().byte_size(), 300);
        assert!(!cache.contains("big"));
    }

    async fn exploding_fill() -> FillResult {
        panic!("fill exploded")
    }

    #[tokio::test]
    async fn test_panicking_fill_releases_waiters() {
        let cache = cache(DEFAULT_MAX_BYTES, 10);

        let result = cache.get_or_fill("k", exploding_fill()).await;

        assert_eq!(result.unwrap_err(), RawFetchFailure::Cancelled);
        assert!(!cache.is_in_flight("k"));
    }
}
