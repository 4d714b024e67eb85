//! Cache Entry Module
//!
//! Defines the structure for individual cached row sets with expiry support.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::executor::RowSet;

// == Cache Entry ==
/// A cached row set and its timestamps.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached result; shared with every caller that hits it
    pub rows: Arc<RowSet>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with an optional time-to-live.
    pub fn new(rows: Arc<RowSet>, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl.map(|ttl| {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            now.saturating_add(ttl_ms)
        });

        Self {
            rows,
            created_at: now,
            expires_at,
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds; `Some(0)` once expired, `None`
    /// when the entry never expires.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
