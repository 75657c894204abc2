//! Fixed-capacity LRU map.

use lru::LruCache;
use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tracing::debug;

/// Counters for one cache tier.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// LRU map with exact single-entry eviction.
///
/// `get` promotes the key to most-recently-used; `has` does not. Inserting a
/// new key at capacity evicts exactly the least-recently-used entry, which is
/// handed back to the caller.
pub struct LruTier<K: Hash + Eq, V> {
    name: &'static str,
    cache: LruCache<K, V>,
    stats: CacheStats,
}

impl<K: Hash + Eq + Debug, V: Clone> LruTier<K, V> {
    /// Create a tier; a capacity of zero is treated as one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            cache: LruCache::new(capacity),
            stats: CacheStats {
                capacity: capacity.get(),
                ..CacheStats::default()
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up and promote.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.cache.get(key) {
            Some(value) => {
                self.stats.hits += 1;
                Some(value.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Membership test without touching recency or counters.
    pub fn has(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    /// Read without promoting.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.cache.peek(key)
    }

    /// Insert or replace; returns the evicted LRU entry if capacity was exceeded.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.stats.inserts += 1;
        if self.cache.contains(&key) {
            self.cache.put(key, value);
            return None;
        }
        let evicted = self.cache.push(key, value);
        if let Some((ref evicted_key, _)) = evicted {
            self.stats.evictions += 1;
            debug!(tier = self.name, key = ?evicted_key, "Evicted LRU entry");
        }
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.cache.pop(key)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.cache.iter().map(|(k, _)| k)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            ..self.stats
        }
    }
}
