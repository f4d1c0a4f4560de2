//! Task deduplication
//!
//! Handles the idempotency lifecycle:
//! - Admitting a delivery (execute, replay, or report in progress)
//! - Recording the first settled outcome per key
//! - Periodically sweeping expired results and stale markers

mod cache;

pub use cache::*;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Run [`IdempotencyCache::sweep`] every `period` until aborted
pub fn spawn_sweeper(cache: Arc<IdempotencyCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = cache.sweep();
            if report.total() > 0 {
                info!(
                    expired_results = report.expired_results,
                    stale_markers = report.stale_markers,
                    remaining = cache.len(),
                    "Idempotency cache swept"
                );
            } else {
                debug!(remaining = cache.len(), "Idempotency cache sweep found nothing to remove");
            }
        }
    })
}
