//! Idle-session reaper.
//!
//! A single background task sweeps the session catalogue on a fixed
//! interval and stops sessions idle past their effective timeout. Sweeps
//! run inline in the task, so one can never overlap another; missed ticks
//! are skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::orchestrator::Orchestrator;

/// Spawn the reaper task. It ticks at the configured interval until the
/// `CancellationToken` fires.
#[must_use]
pub fn spawn_reaper(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; consume it so the first
        // sweep happens one full interval after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("idle reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }
            orchestrator.reap_idle_sessions().await;
        }
    })
}
