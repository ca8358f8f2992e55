//! Background maintenance for the transaction cache.
//!
//! Spawned by [`TransactionCache::start_maintenance_task`] and run until the runtime's
//! shutdown broadcast fires.

use crate::cache::TransactionCache;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Runs [`TransactionCache::run_maintenance`] every `interval`.
///
/// The first pass happens one full interval after start, since warm-up has just
/// populated the cache.
pub(crate) async fn run_maintenance_loop(
    cache: TransactionCache,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!("cache maintenance received shutdown signal");
                break;
            }

            _ = ticker.tick() => {
                cache.run_maintenance();
            }
        }
    }

    info!("cache maintenance task shutdown complete");
}
