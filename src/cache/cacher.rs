//! LRU Cacher Module
//!
//! Bounded cache combining a [`Store`] with LRU tracking and optional expiry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStats, LruTracker, Store};
use crate::error::{OrmError, Result};
use crate::executor::RowSet;

// == Lookup ==
/// Outcome of a cache read. Absence is a normal value, not an error.
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(Arc<RowSet>),
    Miss,
    /// The entry existed but its time-to-live had elapsed; it has been removed
    Expired,
}

impl Lookup {
    pub fn into_rows(self) -> Option<Arc<RowSet>> {
        match self {
            Lookup::Hit(rows) => Some(rows),
            Lookup::Miss | Lookup::Expired => None,
        }
    }
}

// == LRU Cacher ==
/// Least-recently-used cache keyed by opaque strings.
///
/// Every `get` and `put` reorders recency, so all methods take `&mut self`;
/// shared use goes through the owning [`crate::CacheManager`]'s lock.
pub struct LruCacher {
    store: Box<dyn Store>,
    lru: LruTracker,
    stats: CacheStats,
    capacity: usize,
    ttl: Option<Duration>,
}

impl LruCacher {
    // == Constructor ==
    /// Creates a cacher holding at most `capacity` entries.
    ///
    /// # Errors
    /// `InvalidConfiguration` if `capacity` is zero.
    pub fn new(store: impl Store + 'static, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(OrmError::InvalidConfiguration(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            store: Box::new(store),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            capacity,
            ttl: None,
        })
    }

    /// Sets how long entries live; `None` keeps them until evicted.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|ttl| !ttl.is_zero());
        self
    }

    // == Get ==
    /// Looks up a key, promoting it to most recently used on a hit.
    ///
    /// A miss leaves the recency order untouched. An expired entry is
    /// removed and reported as [`Lookup::Expired`].
    pub fn get(&mut self, key: &str) -> Lookup {
        match self.store.get(key) {
            Some(entry) if entry.is_expired() => {
                self.store.delete(key);
                self.lru.remove(key);
                self.stats.record_expiration();
                self.stats.record_miss();
                self.stats.set_total_entries(self.lru.len());
                Lookup::Expired
            }
            Some(entry) => {
                self.lru.touch(key);
                self.stats.record_hit();
                Lookup::Hit(entry.rows)
            }
            None => {
                if self.lru.remove(key) {
                    warn!(key, "cache inconsistency: tracked key missing from store, dropped");
                    self.stats.set_total_entries(self.lru.len());
                }
                self.stats.record_miss();
                Lookup::Miss
            }
        }
    }

    // == Put ==
    /// Inserts or overwrites an entry and promotes it.
    ///
    /// When a new key would exceed capacity, the least recently used entry is
    /// evicted first and its key returned so the caller can drop references
    /// to it.
    pub fn put(&mut self, key: &str, rows: Arc<RowSet>) -> Option<String> {
        let mut evicted = None;

        if !self.lru.contains(key) && self.lru.len() >= self.capacity {
            if let Some(oldest) = self.lru.evict_oldest() {
                self.store.delete(&oldest);
                self.stats.record_eviction();
                debug!(key = %oldest, "evicted least recently used entry");
                evicted = Some(oldest);
            }
        }

        self.store.put(key, CacheEntry::new(rows, self.ttl));
        self.lru.touch(key);
        self.stats.set_total_entries(self.lru.len());

        evicted
    }

    // == Delete ==
    /// Removes an entry. Returns whether it was present; absent keys are a no-op.
    pub fn delete(&mut self, key: &str) -> bool {
        let tracked = self.lru.remove(key);
        let stored = self.store.delete(key);
        self.stats.set_total_entries(self.lru.len());
        tracked || stored
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.store.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Purge Expired ==
    /// Removes every expired entry and returns their keys.
    pub fn purge_expired(&mut self) -> Vec<String> {
        if self.ttl.is_none() {
            return Vec::new();
        }

        let expired: Vec<String> = self
            .lru
            .keys()
            .filter(|key| self.store.get(key).map_or(true, |entry| entry.is_expired()))
            .map(str::to_string)
            .collect();

        for key in &expired {
            self.store.delete(key);
            self.lru.remove(key);
            self.stats.record_expiration();
        }
        self.stats.set_total_entries(self.lru.len());

        expired
    }

    /// Checks presence without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.lru.contains(key)
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lru.keys().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.lru.len());
        stats
    }
}

impl fmt::Debug for LruCacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCacher")
            .field("store", &self.store)
            .field("len", &self.lru.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::executor::Value;
    use std::thread::sleep;

    fn rows(n: i64) -> Arc<RowSet> {
        Arc::new(RowSet::scalar("n", Value::Int(n)))
    }

    fn value_of(lookup: Lookup) -> Option<i64> {
        lookup.into_rows().map(|rows| match rows.rows[0][0] {
            Value::Int(n) => n,
            _ => panic!("unexpected value"),
        })
    }

    fn cacher(capacity: usize) -> LruCacher {
        LruCacher::new(MemoryStore::new(), capacity).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = LruCacher::new(MemoryStore::new(), 0);
        assert!(matches!(result, Err(OrmError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_put_and_get() {
        let mut cache = cacher(10);
        assert!(cache.put("a", rows(1)).is_none());

        assert_eq!(value_of(cache.get("a")), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_miss_has_no_side_effect() {
        let mut cache = cacher(2);
        cache.put("a", rows(1));
        cache.put("b", rows(2));

        assert!(matches!(cache.get("zzz"), Lookup::Miss));
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_capacity_two_scenario() {
        let mut cache = cacher(2);
        cache.put("a", rows(1));
        cache.put("b", rows(2));
        assert_eq!(value_of(cache.get("a")), Some(1));

        let evicted = cache.put("c", rows(3));

        assert_eq!(evicted, Some("b".to_string()));
        assert_eq!(cache.len(), 2);
        assert_eq!(value_of(cache.get("a")), Some(1));
        assert_eq!(value_of(cache.get("c")), Some(3));
        assert!(matches!(cache.get("b"), Lookup::Miss));
    }

    #[test]
    fn test_first_inserted_evicted_at_capacity_plus_one() {
        let mut cache = cacher(3);
        for (i, key) in ["k1", "k2", "k3"].iter().enumerate() {
            cache.put(key, rows(i as i64));
        }
        assert_eq!(cache.put("k4", rows(4)), Some("k1".to_string()));
        assert!(!cache.contains("k1"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let mut cache = cacher(2);
        cache.put("a", rows(1));
        cache.put("b", rows(2));

        assert!(cache.put("a", rows(10)).is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(value_of(cache.get("a")), Some(10));
    }

    #[test]
    fn test_delete_and_clear() {
        let mut cache = cacher(4);
        cache.put("a", rows(1));
        cache.put("b", rows(2));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(matches!(cache.get("b"), Lookup::Miss));
    }

    #[test]
    fn test_stats_hits_and_misses() {
        let mut cache = cacher(4);
        cache.put("a", rows(1));
        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_ttl_expiration() {
        let mut cache = cacher(4).with_ttl(Some(Duration::from_millis(50)));
        cache.put("a", rows(1));
        assert!(matches!(cache.get("a"), Lookup::Hit(_)));

        sleep(Duration::from_millis(80));

        assert!(matches!(cache.get("a"), Lookup::Expired));
        assert!(matches!(cache.get("a"), Lookup::Miss));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_purge_expired() {
        let mut cache = cacher(4).with_ttl(Some(Duration::from_millis(50)));
        cache.put("a", rows(1));
        cache.put("b", rows(2));

        sleep(Duration::from_millis(80));
        cache.put("c", rows(3));

        let mut purged = cache.purge_expired();
        purged.sort();
        assert_eq!(purged, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cache.keys(), vec!["c".to_string()]);
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let cache = cacher(4).with_ttl(Some(Duration::ZERO));
        assert!(cache.ttl().is_none());
    }
}
