//! TTL Cleanup Task
//!
//! Background task that periodically purges expired persistent records.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::EngineShared;

/// Spawns a background task that periodically sweeps expired records.
///
/// The task runs in a loop, sleeping for `interval` between sweeps. It holds
/// only a weak reference to the engine and exits once the engine is dropped
/// or destroyed.
///
/// # Returns
/// A JoinHandle for the spawned task, which the engine aborts on
/// `stop_auto_cleanup` and teardown.
pub(crate) fn spawn_cleanup_task(engine: Weak<EngineShared>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(engine) = engine.upgrade() else {
                debug!("Cache engine dropped, stopping cleanup task");
                break;
            };
            if engine.is_destroyed() {
                debug!("Cache engine destroyed, stopping cleanup task");
                break;
            }

            let removed = engine.run_cleanup().await;
            debug!("TTL cleanup tick removed {} records", removed);
        }
    })
}
