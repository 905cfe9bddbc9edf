//! Async key/value cache with single-flight computation
//!
//! [`MemoryCache`] bounds its size by entry count with least-recently-used
//! eviction and optionally expires entries a fixed time after they were
//! written or last read. [`Cache::get_or_put`] runs at most one computation
//! per key at a time: concurrent callers for a key that is already being
//! computed await that computation instead of starting their own.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Result;

/// A pending value computation handed to [`Cache::get_or_put`]
pub type Compute<V> = BoxFuture<'static, Result<V>>;

/// Generic async cache
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Cached value for `key`, if present and not expired
    async fn get(&self, key: &K) -> Option<V>;

    /// Cached value for `key`, or the result of `compute` (stored on success)
    ///
    /// Concurrent calls for the same key share one computation and all
    /// observe its result. Failures are returned to every waiter and not
    /// cached.
    async fn get_or_put(&self, key: K, compute: Compute<V>) -> Result<V>;

    async fn put(&self, key: K, value: V);

    async fn remove(&self, key: &K) -> Option<V>;

    /// Drop every expired entry
    async fn evict_expired(&self);

    /// Drop every entry
    async fn evict_all(&self);

    /// Evict least recently used entries until at most `size` remain
    async fn trim_to_size(&self, size: usize);

    /// Change the capacity, evicting immediately if it shrank
    async fn resize(&self, max_size: usize);
}

fn default_max_size() -> usize {
    1000
}

/// Capacity and expiry settings for [`MemoryCache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Expire entries this long after they were written
    #[serde(default)]
    pub expire_after_write: Option<Duration>,

    /// Expire entries this long after they were last read or written
    #[serde(default)]
    pub expire_after_access: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            expire_after_write: None,
            expire_after_access: None,
        }
    }
}

impl CacheConfig {
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_expire_after_write(mut self, ttl: Duration) -> Self {
        self.expire_after_write = Some(ttl);
        self
    }

    pub fn with_expire_after_access(mut self, ttl: Duration) -> Self {
        self.expire_after_access = Some(ttl);
        self
    }
}

struct Entry<V> {
    value: V,
    written: Instant,
    accessed: Instant,
}

/// Entries in recency order, least recently used first
struct Entries<K, V> {
    map: IndexMap<K, Entry<V>>,
    max_size: usize,
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
}

impl<K: Hash + Eq, V: Clone> Entries<K, V> {
    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        let written_out = self
            .expire_after_write
            .is_some_and(|ttl| now.duration_since(entry.written) >= ttl);
        let idle_out = self
            .expire_after_access
            .is_some_and(|ttl| now.duration_since(entry.accessed) >= ttl);
        written_out || idle_out
    }

    fn lookup(&mut self, key: &K, now: Instant) -> Option<V> {
        let (key, mut entry) = self.map.shift_remove_entry(key)?;
        if self.is_expired(&entry, now) {
            return None;
        }
        entry.accessed = now;
        let value = entry.value.clone();
        // Re-insert at the most recently used end
        self.map.insert(key, entry);
        Some(value)
    }

    fn store(&mut self, key: K, value: V, now: Instant) {
        self.map.shift_remove(&key);
        self.map.insert(
            key,
            Entry {
                value,
                written: now,
                accessed: now,
            },
        );
        let max_size = self.max_size;
        self.trim(max_size);
    }

    fn trim(&mut self, size: usize) {
        while self.map.len() > size {
            self.map.shift_remove_index(0);
        }
    }
}

type InFlight<V> = Shared<BoxFuture<'static, Result<V>>>;

struct Inner<K, V> {
    entries: Mutex<Entries<K, V>>,
    in_flight: Mutex<HashMap<K, InFlight<V>>>,
}

/// In-memory [`Cache`] implementation
///
/// Cheap to clone; clones share the same storage.
pub struct MemoryCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for MemoryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Entries {
                    map: IndexMap::new(),
                    max_size: config.max_size,
                    expire_after_write: config.expire_after_write,
                    expire_after_access: config.expire_after_access,
                }),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of stored entries, including any not yet evicted as expired
    pub fn len(&self) -> usize {
        self.inner.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.inner.entries.lock().max_size
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V> {
        self.inner.entries.lock().lookup(key, Instant::now())
    }

    async fn get_or_put(&self, key: K, compute: Compute<V>) -> Result<V> {
        let pending = {
            let mut in_flight = self.inner.in_flight.lock();

            // Checked under the in-flight lock so a computation finishing
            // concurrently is either visible here or still registered
            if let Some(value) = self.inner.entries.lock().lookup(&key, Instant::now()) {
                trace!("Cache hit");
                return Ok(value);
            }

            match in_flight.get(&key) {
                Some(pending) => {
                    debug!("Joining in-flight computation");
                    pending.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let owned_key = key.clone();
                    let pending = async move {
                        let result = compute.await;
                        if let Ok(value) = &result {
                            inner
                                .entries
                                .lock()
                                .store(owned_key.clone(), value.clone(), Instant::now());
                        }
                        inner.in_flight.lock().remove(&owned_key);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    async fn put(&self, key: K, value: V) {
        self.inner.entries.lock().store(key, value, Instant::now());
    }

    async fn remove(&self, key: &K) -> Option<V> {
        self.inner
            .entries
            .lock()
            .map
            .shift_remove(key)
            .map(|entry| entry.value)
    }

    async fn evict_expired(&self) {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let before = entries.map.len();
        let (write_ttl, access_ttl) = (entries.expire_after_write, entries.expire_after_access);
        entries.map.retain(|_, entry| {
            let written_out = write_ttl.is_some_and(|ttl| now.duration_since(entry.written) >= ttl);
            let idle_out = access_ttl.is_some_and(|ttl| now.duration_since(entry.accessed) >= ttl);
            !(written_out || idle_out)
        });
        debug!(evicted = before - entries.map.len(), "Evicted expired entries");
    }

    async fn evict_all(&self) {
        self.inner.entries.lock().map.clear();
    }

    async fn trim_to_size(&self, size: usize) {
        self.inner.entries.lock().trim(size);
    }

    async fn resize(&self, max_size: usize) {
        let mut entries = self.inner.entries.lock();
        entries.max_size = max_size;
        entries.trim(max_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(config: CacheConfig) -> MemoryCache<String, String> {
        MemoryCache::new(config)
    }

    fn ready(value: &str) -> Compute<String> {
        let value = value.to_string();
        async move { Ok(value) }.boxed()
    }

    // =========================================================================
    // Single-flight
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_get_or_put_computes_once_for_concurrent_callers() {
        let cache = cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..16).map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                let compute: Compute<String> = async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok("statement".to_string())
                }
                .boxed();
                cache.get_or_put("https://ta.example".into(), compute).await
            })
        });

        let results = futures::future::join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), "statement");
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_compute_independently() {
        let cache = cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = ["a", "b", "c"].into_iter().map(|key| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                let compute: Compute<String> = async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(key.to_uppercase())
                }
                .boxed();
                cache.get_or_put(key.to_string(), compute).await
            })
        });

        for result in futures::future::join_all(callers).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_shared_and_not_cached() {
        let cache = cache(CacheConfig::default());

        let failing: Compute<String> = async { Err(ClientError::HttpError("connection refused".into())) }.boxed();
        let err = cache.get_or_put("k".into(), failing).await.unwrap_err();
        assert_eq!(err, ClientError::HttpError("connection refused".into()));
        assert!(cache.get(&"k".to_string()).await.is_none());

        // The next caller gets a fresh computation
        let value = cache.get_or_put("k".into(), ready("v")).await.unwrap();
        assert_eq!(value, "v");
    }

    #[tokio::test]
    async fn test_get_or_put_prefers_cached_value() {
        let cache = cache(CacheConfig::default());
        cache.put("k".into(), "cached".into()).await;

        let value = cache.get_or_put("k".into(), ready("computed")).await.unwrap();
        assert_eq!(value, "cached");
    }

    // =========================================================================
    // Expiry
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_expire_after_write() {
        let cache = cache(CacheConfig::default().with_expire_after_write(Duration::from_secs(60)));
        cache.put("k".into(), "v".into()).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&"k".to_string()).await.as_deref(), Some("v"));

        // Reads do not extend a write TTL
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&"k".to_string()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_after_access_extended_by_reads() {
        let cache = cache(CacheConfig::default().with_expire_after_access(Duration::from_secs(10)));
        cache.put("k".into(), "v".into()).await;

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(9)).await;
            assert!(cache.get(&"k".to_string()).await.is_some());
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.get(&"k".to_string()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired() {
        let cache = cache(CacheConfig::default().with_expire_after_write(Duration::from_secs(30)));
        cache.put("old".into(), "1".into()).await;
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put("new".into(), "2".into()).await;
        tokio::time::advance(Duration::from_secs(15)).await;

        cache.evict_expired().await;

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&"new".to_string()).await.is_some());
    }

    // =========================================================================
    // Size bounds
    // =========================================================================

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = cache(CacheConfig::default().with_max_size(2));
        cache.put("a".into(), "1".into()).await;
        cache.put("b".into(), "2".into()).await;

        // Touch "a" so "b" becomes least recently used
        assert!(cache.get(&"a".to_string()).await.is_some());
        cache.put("c".into(), "3".into()).await;

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&"b".to_string()).await.is_none());
        assert!(cache.get(&"a".to_string()).await.is_some());
        assert!(cache.get(&"c".to_string()).await.is_some());
    }

    #[tokio::test]
    async fn test_trim_and_resize() {
        let cache = cache(CacheConfig::default());
        for i in 0..10 {
            cache.put(i.to_string(), i.to_string()).await;
        }

        cache.trim_to_size(5).await;
        assert_eq!(cache.len(), 5);
        assert!(cache.get(&"4".to_string()).await.is_none());
        assert!(cache.get(&"5".to_string()).await.is_some());
        // Capacity itself is unchanged
        assert_eq!(cache.max_size(), 1000);

        cache.resize(2).await;
        assert_eq!(cache.max_size(), 2);
        assert_eq!(cache.len(), 2);

        cache.put("x".into(), "x".into()).await;
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_and_evict_all() {
        let cache = cache(CacheConfig::default());
        cache.put("a".into(), "1".into()).await;
        cache.put("b".into(), "2".into()).await;

        assert_eq!(cache.remove(&"a".to_string()).await.as_deref(), Some("1"));
        assert!(cache.remove(&"a".to_string()).await.is_none());

        cache.evict_all().await;
        assert!(cache.is_empty());
    }
}
