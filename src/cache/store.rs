//! Cache Store Module
//!
//! The raw associative container behind a cacher. A store has no ordering or
//! eviction policy of its own.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::cache::CacheEntry;

// == Store ==
/// Key-value container for cache entries.
///
/// Implementations synchronise internally. Absence is reported as `None`,
/// never as an error.
pub trait Store: Send + Sync + fmt::Debug {
    /// Inserts or overwrites an entry.
    fn put(&self, key: &str, entry: CacheEntry);

    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Removes an entry; returns whether one was present.
    fn delete(&self, key: &str) -> bool;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// == Memory Store ==
/// In-process `HashMap` store guarded by a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &str, entry: CacheEntry) {
        self.entries.write().insert(key.to_string(), entry);
    }

    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
