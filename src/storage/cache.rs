//! LRU cache of decoded lookups
//!
//! Holds the sorted, decoded answer of recent `targets`/`sources` queries.
//! Any commit may change an answer, so the storage clears the cache
//! wholesale after each one. Clearing bumps a generation; an answer computed
//! under an older generation is dropped instead of cached.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Which side of an edge a query starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

struct Generation {
    number: u64,
    entries: LruCache<CacheKey, Arc<Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    ordinal: u32,
    direction: Direction,
    location: String,
}

/// Read cache shared by every reader of one storage
pub struct ReadCache {
    cache: Mutex<Generation>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl ReadCache {
    /// Create a new cache with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            cache: Mutex::new(Generation {
                number: 0,
                entries: LruCache::new(capacity),
            }),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    pub fn get(&self, ordinal: u32, direction: Direction, location: &str) -> Option<Arc<Vec<String>>> {
        let key = CacheKey {
            ordinal,
            direction,
            location: location.to_string(),
        };
        let found = self.cache.lock().entries.get(&key).cloned();
        let counter = if found.is_some() {
            &self.hit_count
        } else {
            &self.miss_count
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Current generation; read it before computing an answer
    pub fn generation(&self) -> u64 {
        self.cache.lock().number
    }

    /// Cache `answer` unless the cache was cleared since `generation`
    pub fn put(
        &self,
        generation: u64,
        ordinal: u32,
        direction: Direction,
        location: &str,
        answer: Arc<Vec<String>>,
    ) {
        let mut cache = self.cache.lock();
        if cache.number != generation {
            return;
        }
        let key = CacheKey {
            ordinal,
            direction,
            location: location.to_string(),
        };
        cache.entries.put(key, answer);
    }

    pub fn clear(&self) {
        let mut cache = self.cache.lock();
        cache.number += 1;
        cache.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        let cache = self.cache.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: cache.entries.len(),
            capacity: cache.entries.cap().get(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(values: &[&str]) -> Arc<Vec<String>> {
        Arc::new(values.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_cache_basic() {
        let cache = ReadCache::new(100);
        assert!(cache.get(0, Direction::Forward, "a").is_none());

        cache.put(0, 0, Direction::Forward, "a", answer(&["b", "c"]));
        assert_eq!(
            cache.get(0, Direction::Forward, "a").as_deref(),
            Some(&vec!["b".to_string(), "c".to_string()])
        );
        // Direction and ordinal are part of the key
        assert!(cache.get(0, Direction::Reverse, "a").is_none());
        assert!(cache.get(1, Direction::Forward, "a").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_cache_eviction() {
        let cache = ReadCache::new(2);
        cache.put(0, 0, Direction::Forward, "k1", answer(&["1"]));
        cache.put(0, 0, Direction::Forward, "k2", answer(&["2"]));
        cache.put(0, 0, Direction::Forward, "k3", answer(&["3"]));

        assert!(cache.get(0, Direction::Forward, "k1").is_none());
        assert!(cache.get(0, Direction::Forward, "k2").is_some());
        assert!(cache.get(0, Direction::Forward, "k3").is_some());
    }

    #[test]
    fn test_cache_clear_and_zero_capacity() {
        let cache = ReadCache::new(0);
        assert_eq!(cache.stats().capacity, 1000);

        cache.put(0, 0, Direction::Reverse, "k", answer(&[]));
        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_stale_generation_is_not_cached() {
        let cache = ReadCache::new(10);
        let before = cache.generation();
        cache.clear();
        cache.put(before, 0, Direction::Forward, "k", answer(&["old"]));
        assert!(cache.get(0, Direction::Forward, "k").is_none());

        cache.put(cache.generation(), 0, Direction::Forward, "k", answer(&["new"]));
        assert!(cache.get(0, Direction::Forward, "k").is_some());
    }
}
