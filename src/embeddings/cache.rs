//! Bounded LRU of query embeddings

use std::num::NonZeroUsize;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use lru::LruCache;
use tokio::sync::Mutex;

/// Cache from query key to embedding vector.
///
/// Values go in and come out as owned copies, so callers may mutate what
/// they get back without touching the cached vector.
pub struct EmbeddingResultCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit and miss counters since startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl EmbeddingResultCache {
    /// Returns `None` for a zero capacity, which disables caching.
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Look up a key, promoting it to most recently used.
    pub async fn get(&self, key: &str) -> Option<Vec<f32>> {
        let found = self.inner.lock().await.get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert or replace a key, evicting the least recently used entry when full.
    pub async fn put(&self, key: impl Into<String>, vector: &[f32]) {
        self.inner.lock().await.put(key.into(), vector.to_vec());
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        let guard = self.inner.lock().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: guard.len(),
            capacity: guard.cap().get(),
        }
    }
}
