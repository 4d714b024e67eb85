//! Cache Module
//!
//! Storage, LRU ordering and table bookkeeping for cached query results.

mod cacher;
mod entry;
mod index;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use cacher::{LruCacher, Lookup};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use index::{table_key, IndexSnapshot, TableIndex};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{MemoryStore, Store};

// == Public Constants ==
/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 1000;

/// Entry lifetime used when none is configured, in seconds
pub const DEFAULT_TTL_SECS: u64 = 3600;
