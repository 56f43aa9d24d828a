//! Request and response types for the admin endpoints.
//!
//! Library reports from `catalog-sync` are mapped into these so the wire
//! format and OpenAPI schemas stay owned by the API layer.

use std::collections::BTreeMap;

use catalog_core::EntityId;
use catalog_sync::{
    BatchStatistics, DirtyMark, EmergencyReport, IndexerState, LedgerStatus, RunReport,
    RunTrigger, SweepReport, ValidationOutcome,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// Query for `DELETE /admin/cache/emergency/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct EmergencyEvictQuery {
    /// Why the operator is forcing the eviction. Required.
    pub reason: Option<String>,
}

/// Query for `POST /admin/index/sync`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct IndexSyncQuery {
    /// Resynchronize every row instead of the look-back window.
    #[serde(default)]
    pub full: bool,
}

// ============================================================================
// SWEEP / EMERGENCY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SweepSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cleared_regions: Vec<String>,
}

impl From<SweepReport> for SweepSummary {
    fn from(report: SweepReport) -> Self {
        Self {
            processed: report.processed,
            skipped: report.skipped,
            failed: report.failed,
            cleared_regions: report
                .cleared_regions
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EmergencyEvictResponse {
    pub entity_id: EntityId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub affected_regions: Vec<String>,
    pub sweep: SweepSummary,
}

impl From<EmergencyReport> for EmergencyEvictResponse {
    fn from(report: EmergencyReport) -> Self {
        Self {
            entity_id: report.entity_id,
            reason: report.reason,
            timestamp: report.timestamp,
            affected_regions: report
                .affected_regions
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            sweep: report.sweep.into(),
        }
    }
}

// ============================================================================
// VALIDATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    NotCached,
    Consistent,
    Repaired,
    Evicted,
}

impl From<ValidationOutcome> for ValidationStatus {
    fn from(outcome: ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::NotCached => ValidationStatus::NotCached,
            ValidationOutcome::Consistent => ValidationStatus::Consistent,
            ValidationOutcome::Repaired => ValidationStatus::Repaired,
            ValidationOutcome::Evicted => ValidationStatus::Evicted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ValidateResponse {
    pub entity_id: EntityId,
    pub outcome: ValidationStatus,
}

// ============================================================================
// INDEXER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum IndexTrigger {
    Scheduled,
    OnDemand,
    FullResync,
}

impl From<RunTrigger> for IndexTrigger {
    fn from(trigger: RunTrigger) -> Self {
        match trigger {
            RunTrigger::Scheduled => IndexTrigger::Scheduled,
            RunTrigger::OnDemand => IndexTrigger::OnDemand,
            RunTrigger::FullResync => IndexTrigger::FullResync,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum IndexerPhase {
    Idle,
    Reading,
    Transforming,
    Writing,
}

impl From<IndexerState> for IndexerPhase {
    fn from(state: IndexerState) -> Self {
        match state {
            IndexerState::Idle => IndexerPhase::Idle,
            IndexerState::Reading => IndexerPhase::Reading,
            IndexerState::Transforming => IndexerPhase::Transforming,
            IndexerState::Writing => IndexerPhase::Writing,
        }
    }
}

/// One completed indexer pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IndexRunSummary {
    pub trigger: IndexTrigger,
    pub lower_bound: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_read: u64,
    pub rows_read: u64,
    pub documents_written: u64,
    pub rows_dropped: u64,
    pub chunks_failed: u64,
    /// A page read failed and the rest of the run was abandoned.
    pub read_aborted: bool,
}

impl From<RunReport> for IndexRunSummary {
    fn from(report: RunReport) -> Self {
        Self {
            trigger: report.trigger.into(),
            lower_bound: report.lower_bound,
            started_at: report.started_at,
            finished_at: report.finished_at,
            pages_read: report.pages_read,
            rows_read: report.rows_read,
            documents_written: report.documents_written,
            rows_dropped: report.rows_dropped,
            chunks_failed: report.chunks_failed,
            read_aborted: report.read_aborted,
        }
    }
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DirtyRegionEntry {
    pub region: String,
    pub marked_at: Option<DateTime<Utc>>,
}

impl From<DirtyMark> for DirtyRegionEntry {
    fn from(mark: DirtyMark) -> Self {
        Self {
            region: mark.region.as_str().to_string(),
            marked_at: mark.marked_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchTypeSummary {
    pub count: u64,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchStatsSummary {
    pub date: NaiveDate,
    pub batches: BTreeMap<String, BatchTypeSummary>,
}

impl From<BatchStatistics> for BatchStatsSummary {
    fn from(stats: BatchStatistics) -> Self {
        Self {
            date: stats.date,
            batches: stats
                .batches
                .into_iter()
                .map(|(kind, s)| {
                    (
                        kind,
                        BatchTypeSummary {
                            count: s.count,
                            last_run: s.last_run,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Snapshot returned by `GET /admin/cache/debug/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheStatusResponse {
    pub timestamp: DateTime<Utc>,
    pub cache_backend: String,
    pub dirty_count: usize,
    /// Sorted by region name.
    pub dirty_regions: Vec<DirtyRegionEntry>,
    pub batch_stats: BatchStatsSummary,
    pub indexer_state: IndexerPhase,
    pub last_index_run: Option<IndexRunSummary>,
}

impl CacheStatusResponse {
    pub fn new(
        ledger: LedgerStatus,
        cache_backend: &str,
        indexer_state: IndexerState,
        last_index_run: Option<RunReport>,
    ) -> Self {
        Self {
            timestamp: ledger.checked_at,
            cache_backend: cache_backend.to_string(),
            dirty_count: ledger.dirty_count,
            dirty_regions: ledger.dirty_regions.into_iter().map(Into::into).collect(),
            batch_stats: ledger.batch_stats.into(),
            indexer_state: indexer_state.into(),
            last_index_run: last_index_run.map(Into::into),
        }
    }
}
