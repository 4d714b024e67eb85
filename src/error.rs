//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == ORM Error Enum ==
/// Unified error type for the engine and its cache layer.
///
/// A cache miss is never an error; absence is reported through `Option`
/// or [`crate::cache::Lookup`] values.
#[derive(Error, Debug)]
pub enum OrmError {
    /// Bad capacity, malformed naming strategy, colliding table names
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure reported by the underlying executor, passed through unchanged
    #[error(transparent)]
    Executor(#[from] anyhow::Error),

    /// Internal invariant violation between the table index and the cacher
    #[error("Cache inconsistency: {0}")]
    CacheInconsistency(String),

    /// Executor answered with the wrong kind of result for the call
    #[error("Unexpected executor outcome: {0}")]
    UnexpectedOutcome(String),
}

impl OrmError {
    /// Returns the executor error if this is a pass-through failure.
    pub fn as_executor(&self) -> Option<&anyhow::Error> {
        match self {
            OrmError::Executor(err) => Some(err),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, OrmError>;
