//! Remote graph cache
//!
//! LRU cache of parsed graphs keyed by URI, shared by every request in the
//! process. Entries expire after a TTL; within the TTL a URI is written once.
//! Thread-safe with parking_lot RwLock. Atomic counters for metrics.

use crate::metrics::METRICS;
use lru::LruCache;
use oxigraph::model::Graph;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CachedGraph {
    graph: Arc<Graph>,
    stored_at: Instant,
}

/// Graph cache with LRU eviction and TTL expiry
pub struct GraphCache {
    /// LRU bookkeeping mutates on read, so lookups take the write lock
    entries: RwLock<LruCache<String, CachedGraph>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl GraphCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached graph for `uri`, if present and not expired
    pub fn get(&self, uri: &str) -> Option<Arc<Graph>> {
        let mut entries = self.entries.write();
        let expired = entries
            .peek(uri)
            .is_some_and(|entry| entry.stored_at.elapsed() >= self.ttl);
        if expired {
            entries.pop(uri);
        }
        let fresh = entries.get(uri).map(|entry| entry.graph.clone());
        drop(entries);

        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            METRICS.record_cache_hit();
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            METRICS.record_cache_miss();
        }
        fresh
    }

    /// Stores `graph` unless a fresh entry for `uri` already exists
    pub fn insert(&self, uri: impl Into<String>, graph: Graph) {
        let uri = uri.into();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.peek(&uri) {
            if existing.stored_at.elapsed() < self.ttl {
                return;
            }
        }
        entries.put(
            uri,
            CachedGraph {
                graph: Arc::new(graph),
                stored_at: Instant::now(),
            },
        );
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries
            .read()
            .peek(uri)
            .is_some_and(|entry| entry.stored_at.elapsed() < self.ttl)
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        CacheStats {
            size: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
