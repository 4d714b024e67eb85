//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside an engine.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at configured intervals

mod cleanup;

pub(crate) use cleanup::spawn_sweep_task;
pub use cleanup::spawn_cleanup_task;
