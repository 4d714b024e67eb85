//! Table Index Module
//!
//! Reverse index from table name to the fingerprints cached from reads of
//! that table, plus per-table generation counters used to reject results
//! computed before an invalidation.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::fingerprint::Fingerprint;

/// Normalised index key for a table name.
///
/// Matching is ASCII case-insensitive, so `Users` and `users` share a bucket.
/// On a case-sensitive database this can only widen an invalidation.
pub fn table_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

// == Snapshot ==
/// Generation state of a set of tables at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshot {
    epoch: u64,
    generations: Vec<(String, u64)>,
}

// == Table Index ==
#[derive(Debug, Default)]
pub struct TableIndex {
    /// table -> fingerprints cached for it
    buckets: HashMap<String, HashSet<Fingerprint>>,
    /// fingerprint -> tables it is registered under
    tags: HashMap<Fingerprint, BTreeSet<String>>,
    /// table -> number of invalidations so far
    generations: HashMap<String, u64>,
    /// number of full clears so far
    epoch: u64,
}

impl TableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags a fingerprint with the tables it was read from.
    pub fn register(&mut self, fp: &Fingerprint, tables: &BTreeSet<String>) {
        for table in tables {
            self.buckets
                .entry(table.clone())
                .or_default()
                .insert(fp.clone());
        }
        self.tags
            .entry(fp.clone())
            .or_default()
            .extend(tables.iter().cloned());
    }

    /// Drops a fingerprint from every bucket holding it. Returns whether it
    /// was indexed.
    pub fn forget(&mut self, key: &str) -> bool {
        let Some(tables) = self.tags.remove(key) else {
            return false;
        };
        for table in tables {
            if let Some(bucket) = self.buckets.get_mut(&table) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.buckets.remove(&table);
                }
            }
        }
        true
    }

    /// Removes a table's bucket and bumps its generation. Every returned
    /// fingerprint is forgotten from all other buckets too, since the caller
    /// is about to delete it from the cacher.
    pub fn take_table(&mut self, table: &str) -> Vec<Fingerprint> {
        *self.generations.entry(table.to_string()).or_default() += 1;

        let Some(bucket) = self.buckets.remove(table) else {
            return Vec::new();
        };
        let mut fps: Vec<Fingerprint> = bucket.into_iter().collect();
        fps.sort();
        for fp in &fps {
            self.forget(fp.as_str());
        }
        fps
    }

    /// Empties the index and starts a new epoch.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.tags.clear();
        self.generations.clear();
        self.epoch += 1;
    }

    pub fn snapshot(&self, tables: &BTreeSet<String>) -> IndexSnapshot {
        IndexSnapshot {
            epoch: self.epoch,
            generations: tables
                .iter()
                .map(|t| (t.clone(), self.generation(t)))
                .collect(),
        }
    }

    /// True if no table in the snapshot has been invalidated since it was taken.
    pub fn is_current(&self, snapshot: &IndexSnapshot) -> bool {
        snapshot.epoch == self.epoch
            && snapshot
                .generations
                .iter()
                .all(|(table, gen)| self.generation(table) == *gen)
    }

    pub fn generation(&self, table: &str) -> u64 {
        self.generations.get(table).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    pub fn bucket(&self, table: &str) -> Option<&HashSet<Fingerprint>> {
        self.buckets.get(table)
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.tags.keys()
    }

    /// Number of indexed fingerprints.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn table_count(&self) -> usize {
        self.buckets.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Value;
    use crate::fingerprint::fingerprint;

    fn fp(n: i64) -> Fingerprint {
        fingerprint("SELECT * FROM users WHERE id = ?", &[Value::Int(n)], "users")
    }

    fn tables(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_key() {
        assert_eq!(table_key(" Users "), "users");
    }

    #[test]
    fn test_register_and_take() {
        let mut index = TableIndex::new();
        index.register(&fp(1), &tables(&["users"]));
        index.register(&fp(2), &tables(&["users"]));

        assert_eq!(index.len(), 2);
        assert_eq!(index.bucket("users").unwrap().len(), 2);

        let taken = index.take_table("users");
        assert_eq!(taken.len(), 2);
        assert!(index.is_empty());
        assert!(index.bucket("users").is_none());
    }

    #[test]
    fn test_take_table_forgets_other_tags() {
        let mut index = TableIndex::new();
        index.register(&fp(1), &tables(&["orders", "users"]));

        let taken = index.take_table("users");
        assert_eq!(taken, vec![fp(1)]);
        assert!(index.bucket("orders").is_none());
        assert!(!index.contains(fp(1).as_str()));
    }

    #[test]
    fn test_forget() {
        let mut index = TableIndex::new();
        index.register(&fp(1), &tables(&["users"]));
        index.register(&fp(2), &tables(&["users"]));

        assert!(index.forget(fp(1).as_str()));
        assert!(!index.forget(fp(1).as_str()));
        assert_eq!(index.bucket("users").unwrap().len(), 1);
        assert_eq!(index.table_count(), 1);
    }

    #[test]
    fn test_generation_bumps_on_take() {
        let mut index = TableIndex::new();
        let snapshot = index.snapshot(&tables(&["users"]));
        assert!(index.is_current(&snapshot));

        // An invalidation counts even when nothing was cached
        index.take_table("users");
        assert!(!index.is_current(&snapshot));
        assert_eq!(index.generation("users"), 1);
    }

    #[test]
    fn test_snapshot_unaffected_by_other_tables() {
        let mut index = TableIndex::new();
        let snapshot = index.snapshot(&tables(&["users"]));
        index.take_table("orders");
        assert!(index.is_current(&snapshot));
    }

    #[test]
    fn test_clear_invalidates_snapshots() {
        let mut index = TableIndex::new();
        index.register(&fp(1), &tables(&["users"]));
        let snapshot = index.snapshot(&tables(&["users"]));

        index.clear();
        assert!(index.is_empty());
        assert!(!index.is_current(&snapshot));
    }
}
