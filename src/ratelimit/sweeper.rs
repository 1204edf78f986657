//! Periodic removal of stale timestamp log entries.
//!
//! Sweeping only reclaims storage. It never changes a rate limit decision,
//! so a sweep that fails or is skipped is harmless beyond memory growth.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::store::TimestampLog;
use super::window::SlidingWindow;
use crate::error::StoreError;

/// Prune every key of `log` against the window ending now.
pub async fn sweep_once(log: &dyn TimestampLog, window: &SlidingWindow) -> Result<usize, StoreError> {
    log.sweep(window.start(Utc::now())).await
}

/// Spawn a task that sweeps `log` every `interval` until aborted.
///
/// The first sweep runs one full interval after spawning.
pub fn spawn_sweeper(
    log: Arc<dyn TimestampLog>,
    window: SlidingWindow,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        interval_secs = interval.as_secs_f64(),
        window_secs = window.size().as_secs(),
        "Starting timestamp log sweeper"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match sweep_once(log.as_ref(), &window).await {
                Ok(removed) => debug!(removed = removed, "Sweep tick completed"),
                Err(e) => error!(error = %e, "Timestamp log sweep failed"),
            }
        }
    })
}
