//! Expiration Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;

/// Spawns a background task that periodically sweeps expired entries.
///
/// Each pass scans for expired keys, then removes them in batches of at most
/// `batch_size` per lock acquisition, yielding between batches so mutators
/// are not starved. Removals are not logged.
///
/// The task stops on its own once the engine is closed; the returned handle
/// can also be aborted.
///
/// # Example
/// ```ignore
/// let engine = Arc::new(CacheEngine::open(&config)?);
/// let sweeper = spawn_sweeper(engine.clone(), Duration::from_secs(1), 128);
/// // Later, during shutdown:
/// engine.close().await?;
/// sweeper.await?;
/// ```
pub fn spawn_sweeper(
    engine: Arc<CacheEngine>,
    interval: Duration,
    batch_size: usize,
) -> JoinHandle<()> {
    let mut shutdown = engine.shutdown_signal();

    tokio::spawn(async move {
        info!(
            "Starting expiration sweeper with interval of {}ms",
            interval.as_millis()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let removed = engine.sweep_expired(batch_size).await;

            if removed > 0 {
                info!("Expiration sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiration sweep: no expired entries found");
            }
        }

        info!("Expiration sweeper stopped");
    })
}
