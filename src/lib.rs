//! ormcache - Query-result caching for an ORM layer
//!
//! Per-table LRU caches that serve repeated reads without reaching the
//! database and invalidate precisely on writes, with pluggable naming
//! strategies for mapping entities and fields to tables and columns.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod logging;
pub mod manager;
pub mod mapper;
pub mod statement;
pub mod tasks;

pub use cache::{CacheStats, LruCacher, Lookup, MemoryStore, Store};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{OrmError, Result};
pub use executor::{ExecOutcome, Executor, RowSet, Value};
pub use fingerprint::{fingerprint, Fingerprint};
pub use manager::CacheManager;
pub use mapper::{IdentityMapper, MapperKind, NamingStrategy};
pub use statement::StatementKind;
pub use tasks::spawn_cleanup_task;
