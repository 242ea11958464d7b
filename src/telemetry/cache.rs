use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

/// A cached response body and when it was fetched
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Value>,
    fetched_at: Instant,
}

/// Response cache keyed by `(operation, params)`.
///
/// Entries are replaced wholesale and never edited in place. Stale entries
/// are evicted on lookup and on insert. A key also owns an async lock while
/// a fetch for it is pending, so that at most one fetch per key is in flight;
/// the lock is dropped from the map once nobody holds it.
#[derive(Debug)]
pub struct QueryCache {
    stale_time: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl QueryCache {
    /// Create an empty cache with the given staleness window.
    pub fn new(stale_time: Duration) -> Self {
        Self {
            stale_time,
            entries: Mutex::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build the cache key for an operation and its canonical params.
    pub fn key(operation: &str, params: &[(&str, String)]) -> String {
        if params.is_empty() {
            return operation.to_string();
        }
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", operation, query)
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.fetched_at.elapsed() < self.stale_time
    }

    /// The cached value for `key` if it is still inside the staleness window.
    ///
    /// A stale entry is evicted.
    pub fn get_fresh(&self, key: &str) -> Option<Arc<Value>> {
        let mut entries = lock(&self.entries);
        let entry = entries.get(key)?;
        if self.is_fresh(entry) {
            return Some(Arc::clone(&entry.value));
        }
        entries.remove(key);
        None
    }

    /// Store a freshly fetched value, replacing any previous entry and
    /// evicting every stale one.
    pub fn insert(&self, key: &str, value: Value) -> Arc<Value> {
        let value = Arc::new(value);
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| entry.fetched_at.elapsed() < self.stale_time);
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "Evicted stale responses");
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::clone(&value),
                fetched_at: Instant::now(),
            },
        );
        value
    }

    /// Drop a single entry.
    pub fn invalidate(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    /// Drop every entry belonging to one operation.
    pub fn invalidate_operation(&self, operation: &str) {
        let prefix = format!("{}?", operation);
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|key, _| key != operation && !key.starts_with(&prefix));
        debug!(
            operation = %operation,
            removed = before - entries.len(),
            "Invalidated cached responses"
        );
    }

    /// Drop everything.
    pub fn clear(&self) {
        lock(&self.entries).clear();
        lock(&self.fetch_locks).retain(|_, l| Arc::strong_count(l) > 1);
    }

    /// Number of cached entries, fresh or not yet evicted.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The per-key fetch lock. Hold it across the network call.
    pub fn fetch_lock(&self, key: &str) -> FetchLock<'_> {
        let mut locks = lock(&self.fetch_locks);
        let handle = Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        );
        FetchLock {
            cache: self,
            key: key.to_string(),
            handle,
        }
    }

    /// Number of keys with a fetch lock currently handed out.
    pub fn pending_fetches(&self) -> usize {
        lock(&self.fetch_locks).len()
    }
}

/// Handle on one key's fetch lock; unregisters the lock when the last
/// handle for the key is dropped.
pub struct FetchLock<'a> {
    cache: &'a QueryCache,
    key: String,
    handle: Arc<tokio::sync::Mutex<()>>,
}

impl FetchLock<'_> {
    /// Wait for the key's in-flight fetch, if any, and take the lock.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.handle.lock().await
    }
}

impl Drop for FetchLock<'_> {
    fn drop(&mut self) {
        let mut locks = lock(&self.cache.fetch_locks);
        // Handles are only cloned under this map lock: the map's copy plus
        // ours means no other caller holds this key.
        let unused = locks
            .get(&self.key)
            .is_some_and(|l| Arc::ptr_eq(l, &self.handle) && Arc::strong_count(l) == 2);
        if unused {
            locks.remove(&self.key);
        }
    }
}
