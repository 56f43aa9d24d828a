//! Dirty ledger: TTL-bounded per-region dirty marks kept in the shared
//! key-value store, and the sweep that turns marks into region clears.
//!
//! A mark whose TTL runs out before a sweep disappears without clearing its
//! region. That gap is kept deliberately visible (see the regression test);
//! making marks permanent would leave a stuck mark behind whenever a region
//! name is retired.

use crate::regions::CacheRegionStore;
use catalog_core::constants::{BATCH_STATS_PREFIX, DIRTY_MARK_PREFIX, SEARCH_CACHE_BATCH_TYPE};
use catalog_core::{CatalogError, CatalogResult, Clock, CoherenceConfig, Region, Timestamp};
use catalog_storage::{bounded, KeyValueStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// REPORTS
// ============================================================================

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Regions cleared and unmarked.
    pub processed: usize,
    /// Marks that expired between scan and processing.
    pub skipped: usize,
    /// Regions whose clear or unmark failed; their marks stay for next time.
    pub failed: usize,
    pub cleared_regions: Vec<Region>,
}

/// A current dirty mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirtyMark {
    pub region: Region,
    pub marked_at: Option<Timestamp>,
}

/// Counters for one batch type on one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTypeStats {
    pub count: u64,
    pub last_run: Option<Timestamp>,
}

/// Per-day batch statistics, keyed by batch type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStatistics {
    pub date: NaiveDate,
    pub batches: BTreeMap<String, BatchTypeStats>,
}

/// Read-only ledger snapshot for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    pub dirty_count: usize,
    /// Sorted by region name.
    pub dirty_regions: Vec<DirtyMark>,
    pub batch_stats: BatchStatistics,
    pub checked_at: Timestamp,
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for ledger activity.
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    pub marks_set: AtomicU64,
    pub sweeps: AtomicU64,
    pub regions_processed: AtomicU64,
    pub sweep_failures: AtomicU64,
}

/// Snapshot of ledger metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub marks_set: u64,
    pub sweeps: u64,
    pub regions_processed: u64,
    pub sweep_failures: u64,
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct DirtyLedger {
    kv: Arc<dyn KeyValueStore>,
    regions: Arc<CacheRegionStore>,
    clock: Arc<dyn Clock>,
    mark_ttl: Duration,
    stats_retention: Duration,
    timeout: Duration,
    metrics: LedgerMetrics,
}

fn mark_key(region: &Region) -> String {
    format!("{DIRTY_MARK_PREFIX}{region}")
}

fn stats_key(date: NaiveDate) -> String {
    format!("{BATCH_STATS_PREFIX}{}", date.format("%Y-%m-%d"))
}

fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl DirtyLedger {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        regions: Arc<CacheRegionStore>,
        clock: Arc<dyn Clock>,
        config: &CoherenceConfig,
    ) -> Self {
        Self {
            kv,
            regions,
            clock,
            mark_ttl: config.dirty_mark_ttl,
            stats_retention: config.batch_stats_retention,
            timeout: config.store_timeout,
            metrics: LedgerMetrics::default(),
        }
    }

    pub fn metrics(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            marks_set: self.metrics.marks_set.load(Ordering::Relaxed),
            sweeps: self.metrics.sweeps.load(Ordering::Relaxed),
            regions_processed: self.metrics.regions_processed.load(Ordering::Relaxed),
            sweep_failures: self.metrics.sweep_failures.load(Ordering::Relaxed),
        }
    }

    /// Set or refresh the mark for `region`. Idempotent.
    pub async fn mark_dirty(&self, region: &Region) -> CatalogResult<()> {
        let marked_at = self.clock.now().to_rfc3339();
        bounded(
            "set_with_ttl",
            self.timeout,
            self.kv.set_with_ttl(&mark_key(region), &marked_at, self.mark_ttl),
        )
        .await?;
        self.metrics.marks_set.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(region = %region, "Cache region marked dirty");
        Ok(())
    }

    pub async fn is_dirty(&self, region: &Region) -> CatalogResult<bool> {
        bounded("exists", self.timeout, self.kv.exists(&mark_key(region))).await
    }

    /// Current marks, sorted by region name.
    pub async fn dirty_regions(&self) -> CatalogResult<Vec<DirtyMark>> {
        let keys = bounded(
            "scan_keys_by_prefix",
            self.timeout,
            self.kv.scan_keys_by_prefix(DIRTY_MARK_PREFIX),
        )
        .await?;

        let mut marks = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(name) = key.strip_prefix(DIRTY_MARK_PREFIX) else {
                continue;
            };
            let marked_at = bounded("get", self.timeout, self.kv.get(&key))
                .await?
                .as_deref()
                .and_then(parse_timestamp);
            marks.push(DirtyMark {
                region: Region::from(name),
                marked_at,
            });
        }
        marks.sort_by(|a, b| a.region.cmp(&b.region));
        Ok(marks)
    }

    /// Scheduled sweep. Failures are logged and counted, never returned;
    /// a failed region keeps its mark for the next cycle.
    pub async fn sweep(&self) -> SweepReport {
        match self.run_sweep(false).await {
            Ok(report) => report,
            Err(e) => {
                self.metrics.sweep_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Dirty ledger sweep failed");
                SweepReport::default()
            }
        }
    }

    /// Sweep that must finish before returning and reports any failure.
    pub async fn sweep_now(&self) -> CatalogResult<SweepReport> {
        self.run_sweep(true).await
    }

    async fn run_sweep(&self, strict: bool) -> CatalogResult<SweepReport> {
        self.metrics.sweeps.fetch_add(1, Ordering::Relaxed);
        let keys = bounded(
            "scan_keys_by_prefix",
            self.timeout,
            self.kv.scan_keys_by_prefix(DIRTY_MARK_PREFIX),
        )
        .await?;

        let mut report = SweepReport::default();
        let mut first_error: Option<CatalogError> = None;

        for key in keys {
            let Some(name) = key.strip_prefix(DIRTY_MARK_PREFIX) else {
                continue;
            };
            let region = Region::from(name);

            match self.process_mark(&key, &region).await {
                Ok(true) => {
                    report.processed += 1;
                    report.cleared_regions.push(region);
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    self.metrics.sweep_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(region = %region, error = %e, "Failed to process dirty region");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.metrics
            .regions_processed
            .fetch_add(report.processed as u64, Ordering::Relaxed);

        if report.processed > 0 {
            if let Err(e) = self
                .record_batch(SEARCH_CACHE_BATCH_TYPE, report.processed as i64)
                .await
            {
                tracing::warn!(error = %e, "Failed to record batch statistics");
            }
            tracing::info!(
                processed = report.processed,
                failed = report.failed,
                strict,
                "Dirty ledger sweep completed"
            );
        } else {
            tracing::trace!(strict, "Dirty ledger sweep found nothing to do");
        }

        match first_error {
            Some(e) if strict => Err(e),
            _ => Ok(report),
        }
    }

    /// Clear and unmark one region. `Ok(false)` if the mark already expired.
    async fn process_mark(&self, key: &str, region: &Region) -> CatalogResult<bool> {
        if !bounded("exists", self.timeout, self.kv.exists(key)).await? {
            return Ok(false);
        }
        self.regions.clear(region).await?;
        bounded("delete", self.timeout, self.kv.delete(key)).await?;
        Ok(true)
    }

    async fn record_batch(&self, batch_type: &str, processed: i64) -> CatalogResult<()> {
        let now = self.clock.now();
        let key = stats_key(now.date_naive());
        bounded(
            "hash_increment",
            self.timeout,
            self.kv
                .hash_increment(&key, &format!("{batch_type}_count"), processed),
        )
        .await?;
        bounded(
            "hash_set",
            self.timeout,
            self.kv
                .hash_set(&key, &format!("{batch_type}_last_run"), &now.to_rfc3339()),
        )
        .await?;
        bounded(
            "expire",
            self.timeout,
            self.kv.expire(&key, self.stats_retention),
        )
        .await?;
        Ok(())
    }

    /// Batch statistics recorded on `date`.
    pub async fn batch_statistics(&self, date: NaiveDate) -> CatalogResult<BatchStatistics> {
        let fields = bounded(
            "hash_get_all",
            self.timeout,
            self.kv.hash_get_all(&stats_key(date)),
        )
        .await?;

        let mut batches: BTreeMap<String, BatchTypeStats> = BTreeMap::new();
        for (field, value) in fields {
            if let Some(batch_type) = field.strip_suffix("_count") {
                batches.entry(batch_type.to_string()).or_default().count =
                    value.parse().unwrap_or(0);
            } else if let Some(batch_type) = field.strip_suffix("_last_run") {
                batches.entry(batch_type.to_string()).or_default().last_run =
                    parse_timestamp(&value);
            }
        }
        Ok(BatchStatistics { date, batches })
    }

    pub async fn status(&self) -> CatalogResult<LedgerStatus> {
        let checked_at = self.clock.now();
        let dirty_regions = self.dirty_regions().await?;
        let batch_stats = self.batch_statistics(checked_at.date_naive()).await?;
        Ok(LedgerStatus {
            dirty_count: dirty_regions.len(),
            dirty_regions,
            batch_stats,
            checked_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::ManualClock;
    use catalog_storage::{InMemoryCacheStore, InMemoryKeyValueStore};

    struct Fixture {
        ledger: DirtyLedger,
        cache: Arc<InMemoryCacheStore>,
        kv: Arc<InMemoryKeyValueStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(InMemoryCacheStore::new(clock.clone()));
        let kv = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let config = CoherenceConfig::default();
        let regions = Arc::new(CacheRegionStore::new(cache.clone(), config.store_timeout));
        let ledger = DirtyLedger::new(kv.clone(), regions, clock.clone(), &config);
        Fixture {
            ledger,
            cache,
            kv,
            clock,
        }
    }

    #[tokio::test]
    async fn test_mark_is_idempotent_and_refreshes_ttl() {
        let f = fixture();
        f.ledger
            .mark_dirty(&Region::SEARCH_RESULTS)
            .await
            .expect("mark should succeed");
        f.clock.advance(Duration::from_secs(1800));
        f.ledger
            .mark_dirty(&Region::SEARCH_RESULTS)
            .await
            .expect("mark should succeed");

        let marks = f.ledger.dirty_regions().await.expect("scan should succeed");
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].marked_at, Some(f.clock.now()));
        assert_eq!(
            f.kv.ttl_remaining("cache:dirty:search:search-results"),
            Some(Duration::from_secs(3600))
        );
    }

    #[tokio::test]
    async fn test_sweep_clears_and_unmarks() {
        let f = fixture();
        f.ledger
            .mark_dirty(&Region::SEARCH_RESULTS)
            .await
            .expect("mark should succeed");
        f.ledger
            .mark_dirty(&Region::ADMIN_LISTING)
            .await
            .expect("mark should succeed");

        let report = f.ledger.sweep().await;
        assert_eq!(report.processed, 2);
        assert_eq!(
            report.cleared_regions,
            vec![Region::ADMIN_LISTING, Region::SEARCH_RESULTS]
        );
        assert_eq!(f.cache.clear_count(&Region::SEARCH_RESULTS), 1);
        assert_eq!(f.cache.clear_count(&Region::ADMIN_LISTING), 1);
        assert!(f
            .ledger
            .dirty_regions()
            .await
            .expect("scan should succeed")
            .is_empty());
    }

    #[tokio::test]
    async fn test_sweep_with_no_marks_is_quiet() {
        let f = fixture();
        let report = f.ledger.sweep().await;
        assert_eq!(report, SweepReport::default());
        let stats = f
            .ledger
            .batch_statistics(f.clock.now().date_naive())
            .await
            .expect("stats should succeed");
        assert!(stats.batches.is_empty());
    }

    #[tokio::test]
    async fn test_one_failed_region_does_not_abort_sweep() {
        let f = fixture();
        f.cache.faults().fail("clear_region:search-results");
        f.ledger
            .mark_dirty(&Region::SEARCH_RESULTS)
            .await
            .expect("mark should succeed");
        f.ledger
            .mark_dirty(&Region::ADMIN_LISTING)
            .await
            .expect("mark should succeed");

        let report = f.ledger.sweep().await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert!(f
            .ledger
            .is_dirty(&Region::SEARCH_RESULTS)
            .await
            .expect("exists should succeed"));
        assert!(!f
            .ledger
            .is_dirty(&Region::ADMIN_LISTING)
            .await
            .expect("exists should succeed"));
    }

    #[tokio::test]
    async fn test_sweep_now_reports_failure() {
        let f = fixture();
        f.cache.faults().fail("clear_region:admin-listing");
        f.ledger
            .mark_dirty(&Region::ADMIN_LISTING)
            .await
            .expect("mark should succeed");
        assert!(f.ledger.sweep_now().await.is_err());
    }

    #[tokio::test]
    async fn test_batch_statistics_accumulate() {
        let f = fixture();
        for _ in 0..2 {
            f.ledger
                .mark_dirty(&Region::SEARCH_RESULTS)
                .await
                .expect("mark should succeed");
            f.ledger.sweep().await;
        }

        let status = f.ledger.status().await.expect("status should succeed");
        assert_eq!(status.dirty_count, 0);
        let search = status
            .batch_stats
            .batches
            .get("search_cache")
            .expect("search_cache stats should exist");
        assert_eq!(search.count, 2);
        assert_eq!(search.last_run, Some(f.clock.now()));

        let key = stats_key(f.clock.now().date_naive());
        assert_eq!(
            f.kv.ttl_remaining(&key),
            Some(Duration::from_secs(7 * 24 * 60 * 60))
        );
    }

    #[tokio::test]
    async fn test_key_value_outage_is_swallowed_by_scheduled_sweep() {
        let f = fixture();
        f.kv.faults().fail("scan_keys_by_prefix");
        let report = f.ledger.sweep().await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(f.ledger.metrics().sweep_failures, 1);
    }
}
