//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::manager::CacheManager;

/// Spawns a background task that periodically purges expired entries from
/// `manager`, keeping its table index in step.
///
/// An interval of zero is treated as one second. Abort the returned handle
/// to stop the task.
///
/// # Example
/// ```ignore
/// let manager = engine.default_cache().unwrap();
/// let cleanup_handle = spawn_cleanup_task(manager, 60);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(
    manager: Arc<CacheManager>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    spawn_sweep_task(cleanup_interval_secs, move || vec![manager.clone()])
}

/// Like [`spawn_cleanup_task`], but asks `managers` for the set to sweep on
/// every tick.
pub(crate) fn spawn_sweep_task<F>(cleanup_interval_secs: u64, managers: F) -> JoinHandle<()>
where
    F: Fn() -> Vec<Arc<CacheManager>> + Send + 'static,
{
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed: usize = managers()
                .iter()
                .map(|manager| manager.purge_expired())
                .sum();

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
