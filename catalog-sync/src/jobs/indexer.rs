//! Periodic incremental indexer runs.

use super::JobMetrics;
use crate::indexer::{IncrementalIndexer, RunTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Run the indexer every `period` until shutdown.
///
/// Missed ticks are skipped: the look-back window already covers the
/// interval a skipped run would have read.
pub async fn indexer_task(
    indexer: Arc<IncrementalIndexer>,
    period: Duration,
    metrics: Arc<JobMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<JobMetrics> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = period.as_secs(), "Indexer task started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Indexer task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let report = indexer.run(RunTrigger::Scheduled).await;
                let errors = report.chunks_failed + u64::from(report.read_aborted);
                metrics.record(report.documents_written, errors);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        documents_written = snapshot.processed,
        errors = snapshot.errors,
        "Indexer task completed"
    );

    metrics
}
