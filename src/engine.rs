//! Engine Facade
//!
//! Entry point wiring an [`Executor`] to the naming strategies and the cache
//! managers. Caching is opt-in: a fresh engine has no cacher and every
//! statement goes straight to the executor.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{table_key, CacheStats, LruCacher, MemoryStore, Store};
use crate::config::{EngineConfig, DEFAULT_CLEANUP_INTERVAL_SECS};
use crate::error::{OrmError, Result};
use crate::executor::{ExecOutcome, Executor, RowSet, Value};
use crate::fingerprint::fingerprint;
use crate::manager::CacheManager;
use crate::mapper::{IdentityMapper, NamingStrategy};
use crate::statement::{classify, StatementKind};
use crate::tasks::spawn_sweep_task;

/// Tracing target for statements logged by the show-SQL toggle.
pub const SQL_TARGET: &str = "ormcache::sql";

// == Cache Policies ==
/// How one table is cached, overriding the default cacher.
#[derive(Debug, Clone)]
enum TablePolicy {
    Own(Arc<CacheManager>),
    Disabled,
}

#[derive(Debug, Default)]
struct CachePolicies {
    default: Option<Arc<CacheManager>>,
    tables: HashMap<String, TablePolicy>,
    /// Applied to every cacher created through the engine
    ttl: Option<Duration>,
}

impl CachePolicies {
    /// Manager owning `table`'s cached reads, if the table is cached at all.
    fn resolve(&self, table: &str) -> Option<Arc<CacheManager>> {
        match self.tables.get(table) {
            Some(TablePolicy::Own(manager)) => Some(manager.clone()),
            Some(TablePolicy::Disabled) => None,
            None => self.default.clone(),
        }
    }

    /// The default manager followed by every per-table manager.
    fn managers(&self) -> Vec<Arc<CacheManager>> {
        self.default
            .iter()
            .cloned()
            .chain(self.tables.values().filter_map(|policy| match policy {
                TablePolicy::Own(manager) => Some(manager.clone()),
                TablePolicy::Disabled => None,
            }))
            .collect()
    }

    fn build(&self, store: impl Store + 'static, capacity: usize) -> Result<Arc<CacheManager>> {
        let cacher = LruCacher::new(store, capacity)?.with_ttl(self.ttl);
        Ok(Arc::new(CacheManager::new(cacher)))
    }
}

// == Engine ==
/// Runs statements through the cache layer.
///
/// Share it between tasks with an `Arc`; every method takes `&self`.
pub struct Engine<E: Executor> {
    executor: E,
    /// Shared with the sweep task started by [`Engine::spawn_cleanup`]
    caches: Arc<RwLock<CachePolicies>>,
    table_mapper: RwLock<NamingStrategy>,
    column_mapper: RwLock<NamingStrategy>,
    /// table key -> entity registered for it
    registry: Mutex<HashMap<String, String>>,
    show_sql: AtomicBool,
    show_err: AtomicBool,
    show_warn: AtomicBool,
    show_debug: AtomicBool,
    cleanup_interval_secs: u64,
}

impl<E: Executor> Engine<E> {
    // == Constructors ==
    /// An engine with snake-case naming and no cacher.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            caches: Arc::new(RwLock::new(CachePolicies::default())),
            table_mapper: RwLock::new(NamingStrategy::Snake),
            column_mapper: RwLock::new(NamingStrategy::Snake),
            registry: Mutex::new(HashMap::new()),
            show_sql: AtomicBool::new(false),
            show_err: AtomicBool::new(false),
            show_warn: AtomicBool::new(false),
            show_debug: AtomicBool::new(false),
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }

    /// Builds an engine from validated configuration.
    ///
    /// The table prefix applies to table names only. When caching is enabled
    /// a [`MemoryStore`]-backed default cacher is installed.
    pub fn from_config(executor: E, config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut engine = Self::new(executor);
        engine.cleanup_interval_secs = config.cleanup_interval_secs;
        engine.set_table_mapper(config.table_strategy())?;
        engine.set_column_mapper(config.column_strategy())?;
        engine.caches.write().ttl = config.ttl();

        if config.cache_enabled {
            engine.set_cacher(MemoryStore::new(), config.cache_capacity)?;
        }

        engine.set_show_sql(config.show_sql);
        engine.set_show_err(config.show_err);
        engine.set_show_warn(config.show_warn);
        engine.set_show_debug(config.show_debug);

        info!(
            cache_enabled = config.cache_enabled,
            capacity = config.cache_capacity,
            ttl_secs = config.cache_ttl_secs,
            cleanup_secs = config.cleanup_interval_secs,
            mapper = %config.table_strategy(),
            "engine configured"
        );
        Ok(engine)
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    // == Cacher Configuration ==
    /// Installs a fresh default cacher, replacing any previous one.
    pub fn set_cacher(
        &self,
        store: impl Store + 'static,
        capacity: usize,
    ) -> Result<Arc<CacheManager>> {
        let mut caches = self.caches.write();
        let manager = caches.build(store, capacity)?;
        caches.default = Some(manager.clone());
        info!(capacity, "default cacher installed");
        Ok(manager)
    }

    /// Removes the default cacher. Tables with their own cacher keep it.
    pub fn disable_cache(&self) {
        self.caches.write().default = None;
        info!("default cacher removed");
    }

    /// Entry lifetime for cachers installed after this call.
    pub fn set_cache_ttl(&self, ttl: Option<Duration>) {
        self.caches.write().ttl = ttl.filter(|ttl| !ttl.is_zero());
    }

    /// Gives `table` its own cacher. Its entries in the default cacher are
    /// dropped.
    pub fn set_table_cacher(
        &self,
        table: &str,
        store: impl Store + 'static,
        capacity: usize,
    ) -> Result<Arc<CacheManager>> {
        let table = table_key(table);
        let mut caches = self.caches.write();
        let manager = caches.build(store, capacity)?;
        if let Some(default) = &caches.default {
            default.invalidate_table(&table);
        }
        caches
            .tables
            .insert(table.clone(), TablePolicy::Own(manager.clone()));
        info!(table = %table, capacity, "table cacher installed");
        Ok(manager)
    }

    /// Opts `table` out of caching, even when a default cacher exists.
    pub fn disable_table_cache(&self, table: &str) {
        let table = table_key(table);
        let mut caches = self.caches.write();
        if let Some(default) = &caches.default {
            default.invalidate_table(&table);
        }
        caches.tables.insert(table.clone(), TablePolicy::Disabled);
        info!(table = %table, "table cache disabled");
    }

    /// Returns `table` to the default cache policy.
    pub fn reset_table_cache(&self, table: &str) {
        let table = table_key(table);
        if self.caches.write().tables.remove(&table).is_some() {
            info!(table = %table, "table cache policy reset");
        }
    }

    pub fn default_cache(&self) -> Option<Arc<CacheManager>> {
        self.caches.read().default.clone()
    }

    /// Manager caching reads of `table`, if any.
    pub fn table_cache(&self, table: &str) -> Option<Arc<CacheManager>> {
        self.caches.read().resolve(&table_key(table))
    }

    /// Default cacher statistics, if caching is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.default_cache().map(|manager| manager.stats())
    }

    /// Starts the background sweep of expired entries, running every
    /// `cleanup_interval_secs` from the configuration.
    ///
    /// Each tick covers the default cacher and every per-table cacher,
    /// including ones installed after this call. Must be called from within a
    /// tokio runtime; abort the returned handle to stop the sweep.
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let caches = Arc::clone(&self.caches);
        spawn_sweep_task(self.cleanup_interval_secs, move || caches.read().managers())
    }

    // == Mapper Configuration ==
    /// Sets both the table and the column naming strategy.
    ///
    /// Cached entries and entity registrations made under the old strategy
    /// are cleared.
    pub fn set_mapper(&self, strategy: NamingStrategy) -> Result<()> {
        strategy.validate()?;
        *self.column_mapper.write() = strategy.clone();
        self.set_table_mapper(strategy)
    }

    pub fn set_table_mapper(&self, strategy: NamingStrategy) -> Result<()> {
        strategy.validate()?;
        info!(strategy = %strategy, "table mapper set");
        *self.table_mapper.write() = strategy;
        self.registry.lock().clear();
        self.flush_after_mapper_swap();
        Ok(())
    }

    pub fn set_column_mapper(&self, strategy: NamingStrategy) -> Result<()> {
        strategy.validate()?;
        info!(strategy = %strategy, "column mapper set");
        *self.column_mapper.write() = strategy;
        self.flush_after_mapper_swap();
        Ok(())
    }

    fn flush_after_mapper_swap(&self) {
        let populated = self
            .caches
            .read()
            .managers()
            .iter()
            .any(|manager| !manager.is_empty());
        if populated && self.show_warn.load(Ordering::Relaxed) {
            warn!("naming strategy changed after caches were populated, clearing");
        }
        self.clear_cache();
    }

    // == Name Translation ==
    /// Maps an entity to its table and records the pairing.
    ///
    /// # Errors
    /// `InvalidConfiguration` if a different entity already maps to the same
    /// table under the current strategy.
    pub fn register_entity(&self, entity: &str) -> Result<String> {
        let table = self.table_mapper.read().to_db(entity);
        let mut registry = self.registry.lock();
        match registry.get(&table_key(&table)) {
            Some(existing) if existing != entity => Err(OrmError::InvalidConfiguration(format!(
                "entities '{}' and '{}' both map to table '{}'",
                existing, entity, table
            ))),
            Some(_) => Ok(table),
            None => {
                registry.insert(table_key(&table), entity.to_string());
                debug!(entity, table = %table, "entity registered");
                Ok(table)
            }
        }
    }

    /// Table name for an entity. Registers the entity on first use.
    pub fn table_name(&self, entity: &str) -> Result<String> {
        self.register_entity(entity)
    }

    pub fn column_name(&self, field: &str) -> String {
        self.column_mapper.read().to_db(field)
    }

    pub fn field_name(&self, column: &str) -> String {
        self.column_mapper.read().from_db(column)
    }

    // == Query ==
    /// Runs a statement on behalf of `entity` and returns its rows.
    ///
    /// Plain reads of the entity's table are served through that table's
    /// cacher. A read that touches other tables is not cached and
    /// invalidates every table it references. Non-read statements go
    /// through [`Self::exec`] and must produce rows.
    pub async fn query(&self, entity: &str, sql: &str, params: &[Value]) -> Result<Arc<RowSet>> {
        let table = table_key(&self.table_name(entity)?);

        let kind = classify(sql);
        if kind != StatementKind::Read {
            return match self.exec(sql, params).await? {
                ExecOutcome::Rows(rows) => Ok(Arc::new(rows)),
                ExecOutcome::Affected(n) => Err(OrmError::UnexpectedOutcome(format!(
                    "{:?} statement affected {} rows but returned no row set",
                    kind, n
                ))),
            };
        }

        let mut tables: BTreeSet<String> = self
            .executor
            .tables_referenced_by(sql)
            .iter()
            .map(|t| table_key(t))
            .collect();
        tables.insert(table.clone());

        if tables.len() > 1 {
            if self.show_warn.load(Ordering::Relaxed) {
                warn!(?tables, "multi-table read, executing uncached with invalidation");
            }
            let outcome = self.execute_and_invalidate(&tables, sql, params).await?;
            return match outcome {
                ExecOutcome::Rows(rows) => Ok(Arc::new(rows)),
                ExecOutcome::Affected(n) => Err(OrmError::UnexpectedOutcome(format!(
                    "read returned {} affected rows instead of a row set",
                    n
                ))),
            };
        }

        let manager = self.caches.read().resolve(&table);
        let Some(manager) = manager else {
            if self.show_debug.load(Ordering::Relaxed) {
                debug!(table = %table, "no cacher for table");
            }
            return match self.execute(sql, params).await? {
                ExecOutcome::Rows(rows) => Ok(Arc::new(rows)),
                ExecOutcome::Affected(n) => Err(OrmError::UnexpectedOutcome(format!(
                    "read returned {} affected rows instead of a row set",
                    n
                ))),
            };
        };

        let fp = fingerprint(sql, params, &table);
        if self.show_debug.load(Ordering::Relaxed) {
            debug!(table = %table, fingerprint = %fp, "cached read");
        }
        let result = manager
            .read_through(&Logged(self), fp, &tables, sql, params)
            .await;
        if let Err(err) = &result {
            self.log_error(sql, err);
        }
        result
    }

    // == Exec ==
    /// Runs a statement that is not tied to an entity.
    ///
    /// Writes and schema changes invalidate the tables they reference once
    /// the executor succeeds; when those tables cannot be determined every
    /// cache is cleared. Reads and passthrough statements are never cached.
    pub async fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        let kind = classify(sql);
        if !kind.invalidates() {
            return self.execute(sql, params).await;
        }

        let tables = if kind == StatementKind::Unknown {
            BTreeSet::new()
        } else {
            self.executor
                .tables_referenced_by(sql)
                .iter()
                .map(|t| table_key(t))
                .collect()
        };
        self.execute_and_invalidate(&tables, sql, params).await
    }

    /// Executes, then invalidates `tables` in every cacher that may hold
    /// them. An empty set clears everything.
    async fn execute_and_invalidate(
        &self,
        tables: &BTreeSet<String>,
        sql: &str,
        params: &[Value],
    ) -> Result<ExecOutcome> {
        let outcome = self.execute(sql, params).await?;

        if tables.is_empty() && self.show_warn.load(Ordering::Relaxed) {
            warn!("statement tables unknown, clearing every cache");
        }
        // after the write, so cachers installed meanwhile are included
        for manager in self.caches.read().managers() {
            manager.invalidate_written(tables);
        }
        Ok(outcome)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        let result = Logged(self).execute(sql, params).await.map_err(OrmError::from);
        if let Err(err) = &result {
            self.log_error(sql, err);
        }
        result
    }

    // == Cache Clearing ==
    /// Empties every cacher.
    pub fn clear_cache(&self) {
        for manager in self.caches.read().managers() {
            manager.invalidate_all();
        }
    }

    /// Drops every cached read of `table`. Returns how many entries went.
    pub fn clear_cache_for_table(&self, table: &str) -> usize {
        match self.table_cache(table) {
            Some(manager) => manager.invalidate_table(table),
            None => 0,
        }
    }

    // == Observability Toggles ==
    pub fn set_show_sql(&self, on: bool) {
        self.show_sql.store(on, Ordering::Relaxed);
    }

    pub fn set_show_err(&self, on: bool) {
        self.show_err.store(on, Ordering::Relaxed);
    }

    pub fn set_show_warn(&self, on: bool) {
        self.show_warn.store(on, Ordering::Relaxed);
    }

    pub fn set_show_debug(&self, on: bool) {
        self.show_debug.store(on, Ordering::Relaxed);
    }

    fn log_sql(&self, sql: &str, params: &[Value]) {
        if self.show_sql.load(Ordering::Relaxed) {
            info!(target: SQL_TARGET, ?params, "{}", sql);
        }
    }

    fn log_error(&self, sql: &str, err: &OrmError) {
        if self.show_err.load(Ordering::Relaxed) {
            error!(sql, error = %err, "statement failed");
        }
    }
}

// == Logged Executor ==
/// The engine's executor, logging each statement it actually runs when
/// show-SQL is on. Cache hits never reach it.
struct Logged<'a, E: Executor>(&'a Engine<E>);

impl<E: Executor> Executor for Logged<'_, E> {
    async fn execute(&self, sql: &str, params: &[Value]) -> anyhow::Result<ExecOutcome> {
        self.0.log_sql(sql, params);
        self.0.executor.execute(sql, params).await
    }

    fn tables_referenced_by(&self, sql: &str) -> BTreeSet<String> {
        self.0.executor.tables_referenced_by(sql)
    }
}

impl<E: Executor> std::fmt::Debug for Engine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("caches", &*self.caches.read())
            .field("table_mapper", &*self.table_mapper.read())
            .field("column_mapper", &*self.column_mapper.read())
            .finish_non_exhaustive()
    }
}
