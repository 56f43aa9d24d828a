//! Background jobs
//!
//! - `sweep`: drains the dirty ledger every `sweep_interval`
//! - `indexer`: runs the incremental indexer every `indexer_interval`
//!
//! Both run until the shutdown signal flips to `true`:
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let metrics = Arc::new(JobMetrics::new());
//! tokio::spawn(sweep_task(ledger, config.sweep_interval, metrics.clone(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod indexer;
pub mod sweep;

pub use indexer::indexer_task;
pub use sweep::sweep_task;

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the periodic jobs.
#[derive(Debug, Default)]
pub struct JobMetrics {
    /// Completed cycles
    pub cycles: AtomicU64,
    /// Items handled (regions cleared or documents written)
    pub processed: AtomicU64,
    /// Items that failed
    pub errors: AtomicU64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record(&self, processed: u64, errors: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(processed, Ordering::Relaxed);
        self.errors.fetch_add(errors, Ordering::Relaxed);
    }
}

/// Snapshot of job metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSnapshot {
    pub cycles: u64,
    pub processed: u64,
    pub errors: u64,
}
