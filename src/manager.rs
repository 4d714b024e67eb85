//! Cache Manager
//!
//! Sits between the executor and an [`LruCacher`]: reads are served from the
//! cache when possible, writes invalidate every entry tagged with a table they
//! touched. The cacher and its [`TableIndex`] share one lock so a fingerprint
//! is never cached without being indexed, or indexed without being cached.
//! Executor calls always happen outside that lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{table_key, CacheStats, IndexSnapshot, Lookup, LruCacher, TableIndex};
use crate::error::{OrmError, Result};
use crate::executor::{ExecOutcome, Executor, RowSet, Value};
use crate::fingerprint::Fingerprint;

// == Cache State ==
#[derive(Debug)]
struct CacheState {
    cacher: LruCacher,
    index: TableIndex,
    invalidations: u64,
}

impl CacheState {
    fn lookup(&mut self, fp: &Fingerprint) -> Option<Arc<RowSet>> {
        match self.cacher.get(fp.as_str()) {
            Lookup::Hit(rows) => Some(rows),
            Lookup::Expired => {
                self.index.forget(fp.as_str());
                None
            }
            Lookup::Miss => {
                if self.index.forget(fp.as_str()) {
                    warn!(fingerprint = %fp, "cache inconsistency: indexed fingerprint missing from cacher, dropped");
                }
                None
            }
        }
    }

    fn invalidate_table(&mut self, table: &str) -> usize {
        let fps = self.index.take_table(table);
        for fp in &fps {
            if !self.cacher.delete(fp.as_str()) {
                warn!(fingerprint = %fp, table, "cache inconsistency: indexed fingerprint missing from cacher, ignored");
            }
        }
        self.invalidations += 1;
        fps.len()
    }
}

/// Result of the first, locked step of a read.
enum ReadStart {
    Hit(Arc<RowSet>),
    Miss(IndexSnapshot),
}

// == Cache Manager ==
/// Thread-safe cache orchestration for one cacher.
#[derive(Debug)]
pub struct CacheManager {
    state: Mutex<CacheState>,
}

impl CacheManager {
    pub fn new(cacher: LruCacher) -> Self {
        Self {
            state: Mutex::new(CacheState {
                cacher,
                index: TableIndex::new(),
                invalidations: 0,
            }),
        }
    }

    // == Lookup ==
    /// Returns the cached rows for a fingerprint, promoting it on a hit.
    pub fn lookup(&self, fp: &Fingerprint) -> Option<Arc<RowSet>> {
        self.state.lock().lookup(fp)
    }

    /// Generation state of `tables`, to be handed back to [`Self::populate`].
    pub fn snapshot(&self, tables: &BTreeSet<String>) -> IndexSnapshot {
        self.state.lock().index.snapshot(&keys(tables))
    }

    fn begin_read(&self, fp: &Fingerprint, tables: &BTreeSet<String>) -> ReadStart {
        let mut state = self.state.lock();
        match state.lookup(fp) {
            Some(rows) => ReadStart::Hit(rows),
            None => ReadStart::Miss(state.index.snapshot(tables)),
        }
    }

    // == Populate ==
    /// Caches rows read from `tables` and registers them in the index.
    ///
    /// Skipped, returning false, when any of the tables was invalidated after
    /// `snapshot` was taken: the rows may predate that write.
    pub fn populate(
        &self,
        fp: &Fingerprint,
        tables: &BTreeSet<String>,
        rows: Arc<RowSet>,
        snapshot: &IndexSnapshot,
    ) -> bool {
        let tables = keys(tables);
        let mut state = self.state.lock();

        if !state.index.is_current(snapshot) {
            debug!(fingerprint = %fp, "tables invalidated during read, result not cached");
            return false;
        }

        if let Some(evicted) = state.cacher.put(fp.as_str(), rows) {
            state.index.forget(&evicted);
        }
        state.index.register(fp, &tables);
        true
    }

    // == Invalidate ==
    /// Drops every entry cached from `table`. Returns how many were removed.
    pub fn invalidate_table(&self, table: &str) -> usize {
        let table = table_key(table);
        let removed = self.state.lock().invalidate_table(&table);
        info!(table = %table, removed, "invalidated table cache");
        removed
    }

    /// Invalidates several tables under a single lock acquisition.
    pub fn invalidate_tables(&self, tables: &BTreeSet<String>) -> usize {
        let tables = keys(tables);
        let removed = {
            let mut state = self.state.lock();
            tables
                .iter()
                .map(|table| state.invalidate_table(table))
                .sum::<usize>()
        };
        info!(?tables, removed, "invalidated table caches");
        removed
    }

    /// Invalidation after a write to `tables`. An empty set means the
    /// tables are unknown and empties the whole cache.
    pub fn invalidate_written(&self, tables: &BTreeSet<String>) {
        if tables.is_empty() {
            self.invalidate_all();
        } else {
            self.invalidate_tables(tables);
        }
    }

    /// Empties the cache and the index.
    pub fn invalidate_all(&self) {
        let mut state = self.state.lock();
        let removed = state.cacher.len();
        state.cacher.clear();
        state.index.clear();
        state.invalidations += 1;
        info!(removed, "cleared cache");
    }

    // == Purge Expired ==
    /// Removes expired entries from the cacher and the index.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let expired = state.cacher.purge_expired();
        for key in &expired {
            state.index.forget(key);
        }
        expired.len()
    }

    // == Read Through ==
    /// Serves a read from the cache, or runs it and caches the rows.
    ///
    /// On a hit the executor is never called. Executor errors are returned
    /// unchanged and leave the cache untouched.
    pub async fn read_through<E: Executor>(
        &self,
        executor: &E,
        fp: Fingerprint,
        tables: &BTreeSet<String>,
        sql: &str,
        params: &[Value],
    ) -> Result<Arc<RowSet>> {
        let tables = keys(tables);
        let snapshot = match self.begin_read(&fp, &tables) {
            ReadStart::Hit(rows) => {
                debug!(fingerprint = %fp, "cache hit");
                return Ok(rows);
            }
            ReadStart::Miss(snapshot) => snapshot,
        };
        debug!(fingerprint = %fp, "cache miss");

        let rows = match executor.execute(sql, params).await? {
            ExecOutcome::Rows(rows) => Arc::new(rows),
            ExecOutcome::Affected(n) => {
                return Err(OrmError::UnexpectedOutcome(format!(
                    "read returned {} affected rows instead of a row set",
                    n
                )))
            }
        };

        self.populate(&fp, &tables, rows.clone(), &snapshot);
        Ok(rows)
    }

    // == Write Through ==
    /// Runs a write, then invalidates the tables it touched in this cache.
    ///
    /// For callers driving a single manager directly. [`crate::Engine`] may
    /// hold several cachers, so it executes once and then applies
    /// [`Self::invalidate_written`] to each of them instead.
    ///
    /// An empty `tables` set means the tables are unknown and clears the whole
    /// cache. Invalidation completes before this returns; on executor error
    /// nothing is invalidated.
    pub async fn write_through<E: Executor>(
        &self,
        executor: &E,
        tables: &BTreeSet<String>,
        sql: &str,
        params: &[Value],
    ) -> Result<ExecOutcome> {
        let outcome = executor.execute(sql, params).await?;
        self.invalidate_written(tables);
        Ok(outcome)
    }

    // == Consistency ==
    /// Verifies that the index and the cacher agree in both directions.
    ///
    /// # Errors
    /// `CacheInconsistency` naming the first offending fingerprint.
    pub fn check_consistency(&self) -> Result<()> {
        let state = self.state.lock();

        if let Some(fp) = state
            .index
            .fingerprints()
            .find(|fp| !state.cacher.contains(fp.as_str()))
        {
            return Err(OrmError::CacheInconsistency(format!(
                "fingerprint {} is indexed but not cached",
                fp
            )));
        }

        if let Some(key) = state
            .cacher
            .keys()
            .into_iter()
            .find(|key| !state.index.contains(key))
        {
            return Err(OrmError::CacheInconsistency(format!(
                "fingerprint {} is cached but not indexed",
                key
            )));
        }

        Ok(())
    }

    // == Accessors ==
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.cacher.stats();
        stats.invalidations = state.invalidations;
        stats.indexed_tables = state.index.table_count();
        stats
    }

    /// Fingerprints currently cached for `table`.
    pub fn fingerprints_for(&self, table: &str) -> Vec<Fingerprint> {
        let state = self.state.lock();
        let mut fps: Vec<Fingerprint> = state
            .index
            .bucket(&table_key(table))
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default();
        fps.sort();
        fps
    }

    /// True if `fp` is registered under `table`.
    pub fn is_tracked(&self, table: &str, fp: &Fingerprint) -> bool {
        self.state
            .lock()
            .index
            .bucket(&table_key(table))
            .is_some_and(|bucket| bucket.contains(fp))
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.state.lock().cacher.contains(fp.as_str())
    }

    pub fn len(&self) -> usize {
        self.state.lock().cacher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().cacher.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().cacher.capacity()
    }
}

fn keys(tables: &BTreeSet<String>) -> BTreeSet<String> {
    tables.iter().map(|t| table_key(t)).collect()
}
