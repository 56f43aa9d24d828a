//! Incremental Indexer
//!
//! Each run reads every row modified since `now - overlap_window`, rebuilds
//! the full search document for each row and bulk-upserts the documents in
//! chunks. There is no persisted cursor: the lower bound is re-derived from
//! the clock on every run, and overlapping runs are harmless because every
//! write is a full-document overwrite.
//!
//! ```text
//! Idle -> Reading -> Transforming -> (Reading ...) -> Writing -> Idle
//! ```
//!
//! Page reads go through a reader pool of `reader_concurrency` permits. When
//! the primary store can address pages up front, up to that many pages are
//! read ahead of the one being transformed. Chunk writes run as background
//! tasks, at most `throttle_limit` at a time, so reading continues while
//! earlier chunks are still being written.

mod transform;

pub use transform::{suggestions_for, transform_row};

use catalog_core::{CatalogResult, ChangedRow, Clock, CoherenceConfig, IndexDocument, Timestamp};
use catalog_storage::{bounded, ChangedPage, PageToken, PrimaryStore, SearchStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

// ============================================================================
// STATE AND REPORTS
// ============================================================================

/// Phase the current run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerState {
    Idle,
    Reading,
    Transforming,
    Writing,
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Periodic run with the overlap window as look-back.
    Scheduled,
    /// Operator-requested run with the overlap window as look-back.
    OnDemand,
    /// Operator-requested run over every row.
    FullResync,
}

/// Outcome of one indexer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub trigger: RunTrigger,
    pub lower_bound: Timestamp,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub pages_read: u64,
    pub rows_read: u64,
    pub documents_written: u64,
    pub rows_dropped: u64,
    pub chunks_failed: u64,
    /// A page fetch failed and the remaining pages were not read.
    pub read_aborted: bool,
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct IndexerMetrics {
    pub runs: AtomicU64,
    pub documents_written: AtomicU64,
    pub rows_dropped: AtomicU64,
    pub chunk_failures: AtomicU64,
    pub read_failures: AtomicU64,
}

/// Snapshot of indexer metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerSnapshot {
    pub runs: u64,
    pub documents_written: u64,
    pub rows_dropped: u64,
    pub chunk_failures: u64,
    pub read_failures: u64,
}

// ============================================================================
// INDEXER
// ============================================================================

pub struct IncrementalIndexer {
    primary: Arc<dyn PrimaryStore>,
    search: Arc<dyn SearchStore>,
    clock: Arc<dyn Clock>,
    overlap_window: Duration,
    chunk_size: usize,
    timeout: Duration,
    readers: Arc<Semaphore>,
    throttle: Arc<Semaphore>,
    run_lock: tokio::sync::Mutex<()>,
    state: Mutex<IndexerState>,
    last_report: Mutex<Option<RunReport>>,
    metrics: IndexerMetrics,
}

/// Result of one page read task.
struct PageOutcome {
    page: u64,
    result: CatalogResult<ChangedPage>,
}

/// Read position within one run.
#[derive(Default)]
struct ReadCursor {
    /// Index of the next page to issue a read for.
    next_fetch: u64,
    /// Index of the next page to transform.
    next_process: u64,
    /// Continuation token for page `next_process`, from the page before it.
    chained: Option<PageToken>,
}

/// Result of one chunk write task.
struct ChunkOutcome {
    chunk: u64,
    documents: usize,
    result: CatalogResult<usize>,
}

impl IncrementalIndexer {
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        search: Arc<dyn SearchStore>,
        clock: Arc<dyn Clock>,
        config: &CoherenceConfig,
    ) -> Self {
        Self {
            primary,
            search,
            clock,
            overlap_window: config.overlap_window,
            chunk_size: config.chunk_size.max(1),
            timeout: config.store_timeout,
            readers: Arc::new(Semaphore::new(config.reader_concurrency.max(1))),
            throttle: Arc::new(Semaphore::new(config.throttle_limit.max(1))),
            run_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(IndexerState::Idle),
            last_report: Mutex::new(None),
            metrics: IndexerMetrics::default(),
        }
    }

    pub fn state(&self) -> IndexerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: IndexerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn metrics(&self) -> IndexerSnapshot {
        IndexerSnapshot {
            runs: self.metrics.runs.load(Ordering::Relaxed),
            documents_written: self.metrics.documents_written.load(Ordering::Relaxed),
            rows_dropped: self.metrics.rows_dropped.load(Ordering::Relaxed),
            chunk_failures: self.metrics.chunk_failures.load(Ordering::Relaxed),
            read_failures: self.metrics.read_failures.load(Ordering::Relaxed),
        }
    }

    /// Lower bound a run started at `now` would use.
    pub fn lower_bound(&self, trigger: RunTrigger, now: Timestamp) -> Timestamp {
        match trigger {
            RunTrigger::FullResync => DateTime::<Utc>::UNIX_EPOCH,
            RunTrigger::Scheduled | RunTrigger::OnDemand => {
                let window = chrono::Duration::from_std(self.overlap_window)
                    .unwrap_or(chrono::Duration::MAX);
                now.checked_sub_signed(window)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            }
        }
    }

    /// Run one pass. Runs are serialized; a caller arriving mid-run waits
    /// for it to finish and then runs its own pass.
    ///
    /// Per-row and per-chunk failures are logged and counted in the report,
    /// never returned.
    pub async fn run(&self, trigger: RunTrigger) -> RunReport {
        let _running = self.run_lock.lock().await;
        let started_at = self.clock.now();
        let lower_bound = self.lower_bound(trigger, started_at);

        let mut report = RunReport {
            trigger,
            lower_bound,
            started_at,
            finished_at: started_at,
            pages_read: 0,
            rows_read: 0,
            documents_written: 0,
            rows_dropped: 0,
            chunks_failed: 0,
            read_aborted: false,
        };

        tracing::debug!(?trigger, lower_bound = %lower_bound, "Indexer run starting");

        let mut writes: JoinSet<ChunkOutcome> = JoinSet::new();
        let mut reads: JoinSet<PageOutcome> = JoinSet::new();
        // Pages can arrive out of order; they are transformed in order.
        let mut arrived: BTreeMap<u64, CatalogResult<ChangedPage>> = BTreeMap::new();
        let mut cursor = ReadCursor::default();

        loop {
            self.fill_reads(&mut reads, lower_bound, &mut cursor);

            if let Some(result) = arrived.remove(&cursor.next_process) {
                let page = match result {
                    Ok(page) => page,
                    Err(e) => {
                        self.abort_reading(&mut report, &e);
                        break;
                    }
                };
                cursor.next_process += 1;
                report.pages_read += 1;
                report.rows_read += page.rows.len() as u64;

                self.set_state(IndexerState::Transforming);
                let (documents, dropped) = transform_chunk(&page.rows);
                report.rows_dropped += dropped;

                if !documents.is_empty() {
                    self.spawn_write(&mut writes, report.pages_read, documents).await;
                }

                // Reap finished writes without blocking so the set stays small.
                while let Some(joined) = writes.try_join_next() {
                    self.record_write(joined, &mut report);
                }

                match page.next_page_token {
                    Some(next) if !page.rows.is_empty() => cursor.chained = Some(next),
                    _ => break,
                }
                continue;
            }

            self.set_state(IndexerState::Reading);
            match reads.join_next().await {
                Some(Ok(PageOutcome { page, result })) => {
                    arrived.insert(page, result);
                }
                Some(Err(e)) => {
                    self.abort_reading(&mut report, &e);
                    break;
                }
                None => break,
            }
        }

        // Reads issued past the last page are no longer needed.
        reads.shutdown().await;

        self.set_state(IndexerState::Writing);
        while let Some(joined) = writes.join_next().await {
            self.record_write(joined, &mut report);
        }

        report.finished_at = self.clock.now();
        self.set_state(IndexerState::Idle);

        self.metrics.runs.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .documents_written
            .fetch_add(report.documents_written, Ordering::Relaxed);
        self.metrics
            .rows_dropped
            .fetch_add(report.rows_dropped, Ordering::Relaxed);

        if report.documents_written > 0 || report.chunks_failed > 0 || report.read_aborted {
            tracing::info!(
                ?trigger,
                rows_read = report.rows_read,
                documents_written = report.documents_written,
                rows_dropped = report.rows_dropped,
                chunks_failed = report.chunks_failed,
                read_aborted = report.read_aborted,
                "Indexer run completed"
            );
        }

        *self.last_report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        report
    }

    /// Issue page reads while reader permits are free and the next page can
    /// be addressed. Stores with positional tokens get reads ahead of the
    /// page being transformed; cursor-only stores get one read at a time.
    fn fill_reads(
        &self,
        reads: &mut JoinSet<PageOutcome>,
        since: Timestamp,
        cursor: &mut ReadCursor,
    ) {
        loop {
            let Ok(permit) = Arc::clone(&self.readers).try_acquire_owned() else {
                return;
            };
            let page = cursor.next_fetch;
            let token = if page == 0 {
                None
            } else if let Some(token) = self.primary.page_token_at(page, self.chunk_size) {
                Some(token)
            } else if page == cursor.next_process {
                match cursor.chained.take() {
                    Some(token) => Some(token),
                    None => return,
                }
            } else {
                return;
            };

            let primary = Arc::clone(&self.primary);
            let page_size = self.chunk_size;
            let timeout = self.timeout;
            reads.spawn(async move {
                let _permit = permit;
                let result = bounded(
                    "find_changed_since",
                    timeout,
                    primary.find_changed_since(since, page_size, token),
                )
                .await;
                PageOutcome { page, result }
            });
            cursor.next_fetch += 1;
        }
    }

    fn abort_reading(&self, report: &mut RunReport, error: &dyn std::fmt::Display) {
        self.metrics.read_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            error = %error,
            pages_read = report.pages_read,
            "Indexer page fetch failed, remaining pages skipped"
        );
        report.read_aborted = true;
    }

    /// Spawn a chunk write once a throttle permit is available.
    async fn spawn_write(
        &self,
        writes: &mut JoinSet<ChunkOutcome>,
        chunk: u64,
        documents: Vec<IndexDocument>,
    ) {
        let permit = match Arc::clone(&self.throttle).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!(chunk, "Indexer throttle closed, chunk not written");
                return;
            }
        };
        let search = Arc::clone(&self.search);
        let timeout = self.timeout;

        writes.spawn(async move {
            let _permit = permit;
            let result = bounded("bulk_upsert", timeout, search.bulk_upsert(&documents)).await;
            ChunkOutcome {
                chunk,
                documents: documents.len(),
                result,
            }
        });
    }

    fn record_write(
        &self,
        joined: Result<ChunkOutcome, tokio::task::JoinError>,
        report: &mut RunReport,
    ) {
        match joined {
            Ok(ChunkOutcome {
                result: Ok(written),
                ..
            }) => report.documents_written += written as u64,
            Ok(ChunkOutcome {
                chunk,
                documents,
                result: Err(e),
            }) => {
                report.chunks_failed += 1;
                self.metrics.chunk_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(chunk, documents, error = %e, "Indexer chunk write failed");
            }
            Err(e) => {
                report.chunks_failed += 1;
                self.metrics.chunk_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Indexer chunk task panicked");
            }
        }
    }
}

/// Transform a page, dropping rows that fail validation.
fn transform_chunk(rows: &[ChangedRow]) -> (Vec<IndexDocument>, u64) {
    let mut documents = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        match transform_row(row) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                dropped += 1;
                tracing::error!(entity_id = %row.entity_id, error = %e, "Dropping malformed row");
            }
        }
    }
    (documents, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{EntityId, ManualClock, RelatedReview, ReviewStatus};
    use catalog_storage::{InMemoryPrimaryStore, InMemorySearchStore};
    use serde_json::{json, Map, Value};

    fn changed(id: i64, at: Timestamp) -> ChangedRow {
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), Value::String(format!("Item {id}")));
        ChangedRow {
            entity_id: EntityId::new(id),
            last_modified: at,
            attributes,
            statistics: None,
            reviews: Vec::new(),
        }
    }

    fn indexer(
        primary: Arc<InMemoryPrimaryStore>,
        search: Arc<InMemorySearchStore>,
        clock: Arc<ManualClock>,
        chunk_size: usize,
    ) -> IncrementalIndexer {
        let config = CoherenceConfig {
            chunk_size,
            ..CoherenceConfig::default()
        };
        IncrementalIndexer::new(primary, search, clock, &config)
    }

    #[tokio::test]
    async fn test_rows_outside_window_are_skipped() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now();
        let primary = Arc::new(InMemoryPrimaryStore::with_rows([
            changed(1, now - chrono::Duration::minutes(2)),
            changed(2, now - chrono::Duration::minutes(30)),
        ]));
        let search = Arc::new(InMemorySearchStore::new());
        let indexer = indexer(primary, search.clone(), clock, 200);

        let report = indexer.run(RunTrigger::Scheduled).await;
        assert_eq!(report.rows_read, 1);
        assert_eq!(report.documents_written, 1);
        assert_eq!(search.snapshot()[0].entity_id, EntityId::new(1));
        assert_eq!(indexer.state(), IndexerState::Idle);
    }

    #[tokio::test]
    async fn test_full_resync_reads_everything() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now();
        let primary = Arc::new(InMemoryPrimaryStore::with_rows(
            (1..=5).map(|id| changed(id, now - chrono::Duration::days(id))),
        ));
        let search = Arc::new(InMemorySearchStore::new());
        let indexer = indexer(primary, search.clone(), clock, 2);

        let report = indexer.run(RunTrigger::FullResync).await;
        assert_eq!(report.lower_bound, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(report.pages_read, 3);
        assert_eq!(report.documents_written, 5);
        assert_eq!(search.document_count(), 5);
        assert_eq!(indexer.last_report(), Some(report));
    }

    #[tokio::test]
    async fn test_malformed_row_is_dropped_not_fatal() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now();
        let mut bad = changed(2, now);
        bad.reviews.push(RelatedReview {
            rating: 42,
            status: ReviewStatus::Active,
        });
        let primary = Arc::new(InMemoryPrimaryStore::with_rows([changed(1, now), bad]));
        let search = Arc::new(InMemorySearchStore::new());
        let indexer = indexer(primary, search.clone(), clock, 200);

        let report = indexer.run(RunTrigger::OnDemand).await;
        assert_eq!(report.rows_dropped, 1);
        assert_eq!(report.documents_written, 1);
        assert_eq!(indexer.metrics().rows_dropped, 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_stop_the_run() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now();
        let primary = Arc::new(InMemoryPrimaryStore::with_rows(
            (1..=6).map(|id| changed(id, now - chrono::Duration::seconds(id))),
        ));
        let search = Arc::new(InMemorySearchStore::new());
        search.faults().fail("bulk_upsert:3");
        let indexer = indexer(primary, search.clone(), clock, 2);

        let report = indexer.run(RunTrigger::Scheduled).await;
        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.documents_written, 4);
        assert!(search.get(EntityId::new(3)).await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_read_failure_aborts_reading_only() {
        let clock = Arc::new(ManualClock::starting_now());
        let primary = Arc::new(InMemoryPrimaryStore::new());
        primary.faults().fail("find_changed_since");
        let search = Arc::new(InMemorySearchStore::new());
        let indexer = indexer(primary, search, clock, 200);

        let report = indexer.run(RunTrigger::Scheduled).await;
        assert!(report.read_aborted);
        assert_eq!(report.pages_read, 0);
        assert_eq!(indexer.metrics().read_failures, 1);
    }

    /// Change feed that only hands out cursor tokens.
    struct CursorOnly(Arc<InMemoryPrimaryStore>);

    #[async_trait::async_trait]
    impl PrimaryStore for CursorOnly {
        async fn find_changed_since(
            &self,
            since: Timestamp,
            page_size: usize,
            page_token: Option<PageToken>,
        ) -> CatalogResult<ChangedPage> {
            self.0.find_changed_since(since, page_size, page_token).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cursor_only_store_is_read_one_page_at_a_time() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now();
        let primary = Arc::new(InMemoryPrimaryStore::with_rows(
            (1..=12).map(|id| changed(id, now - chrono::Duration::seconds(id))),
        ));
        primary.faults().set_latency(Duration::from_millis(10));
        let search = Arc::new(InMemorySearchStore::new());
        let config = CoherenceConfig {
            chunk_size: 3,
            reader_concurrency: 4,
            ..CoherenceConfig::default()
        };
        let indexer = IncrementalIndexer::new(
            Arc::new(CursorOnly(primary.clone())),
            search.clone(),
            clock,
            &config,
        );

        let report = indexer.run(RunTrigger::OnDemand).await;
        assert_eq!(report.pages_read, 4);
        assert_eq!(report.documents_written, 12);
        assert_eq!(primary.fetch_concurrency().peak(), 1);
        assert_eq!(search.document_count(), 12);
    }

    #[test]
    fn test_document_json_is_stable() {
        let row = changed(9, DateTime::<Utc>::UNIX_EPOCH);
        let doc = transform_row(&row).expect("transform should succeed");
        let value = serde_json::to_value(&doc).expect("serialize should succeed");
        assert_eq!(value["suggestions"], json!(["Item 9", "item"]));
        assert_eq!(value["rating"], json!({"average": 0.0, "count": 0}));
    }
}
