//! Periodic dirty-ledger sweep.

use super::JobMetrics;
use crate::ledger::DirtyLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Sweep the ledger every `period` until shutdown. The first sweep happens
/// one full period after start.
pub async fn sweep_task(
    ledger: Arc<DirtyLedger>,
    period: Duration,
    metrics: Arc<JobMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<JobMetrics> {
    let mut ticker = interval_at(Instant::now() + period, period);
    // A slow sweep pushes the schedule back instead of bursting.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = period.as_secs(), "Dirty ledger sweep task started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Dirty ledger sweep task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let report = ledger.sweep().await;
                metrics.record(report.processed as u64, report.failed as u64);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        regions_cleared = snapshot.processed,
        errors = snapshot.errors,
        "Dirty ledger sweep task completed"
    );

    metrics
}
