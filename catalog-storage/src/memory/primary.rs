use super::{ConcurrencyGauge, FaultPlan};
use crate::traits::{ChangedPage, DetailSource, PageToken, PrimaryStore, ViewRecorder};
use async_trait::async_trait;
use catalog_core::{CatalogResult, ChangedRow, EntityDetail, EntityId, StorageError, Timestamp};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

const BACKEND: &str = "memory-primary";

/// In-memory change feed.
///
/// Page tokens encode an offset into the `(last_modified, entity_id)`
/// ordering of the matching rows, so any page can be addressed up front.
#[derive(Debug, Default)]
pub struct InMemoryPrimaryStore {
    rows: DashMap<EntityId, ChangedRow>,
    fetches: AtomicU64,
    gauge: ConcurrencyGauge,
    faults: FaultPlan,
}

impl InMemoryPrimaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = ChangedRow>) -> Self {
        let store = Self::new();
        for row in rows {
            store.upsert_row(row);
        }
        store
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn upsert_row(&self, row: ChangedRow) {
        self.rows.insert(row.entity_id, row);
    }

    pub fn remove_row(&self, entity_id: EntityId) {
        self.rows.remove(&entity_id);
    }

    /// Number of `find_changed_since` calls served.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn fetch_concurrency(&self) -> &ConcurrencyGauge {
        &self.gauge
    }
}

fn decode_offset(token: Option<PageToken>) -> CatalogResult<usize> {
    match token {
        None => Ok(0),
        Some(PageToken(raw)) => raw.parse::<usize>().map_err(|_| {
            StorageError::OperationFailed {
                operation: "find_changed_since".to_string(),
                reason: format!("malformed page token {raw:?}"),
            }
            .into()
        }),
    }
}

#[async_trait]
impl PrimaryStore for InMemoryPrimaryStore {
    async fn find_changed_since(
        &self,
        since: Timestamp,
        page_size: usize,
        page_token: Option<PageToken>,
    ) -> CatalogResult<ChangedPage> {
        let _guard = self.gauge.enter();
        self.faults.check(BACKEND, "find_changed_since").await?;
        let offset = decode_offset(page_token)?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let mut matching: Vec<ChangedRow> = self
            .rows
            .iter()
            .filter(|r| r.last_modified >= since)
            .map(|r| r.value().clone())
            .collect();
        matching.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then(a.entity_id.cmp(&b.entity_id))
        });

        let rows: Vec<ChangedRow> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect();
        let consumed = offset + rows.len();
        let next_page_token = if !rows.is_empty() && consumed < matching.len() {
            Some(PageToken(consumed.to_string()))
        } else {
            None
        };

        Ok(ChangedPage {
            rows,
            next_page_token,
        })
    }

    fn page_token_at(&self, page_index: u64, page_size: usize) -> Option<PageToken> {
        let offset = usize::try_from(page_index).ok()?.checked_mul(page_size)?;
        Some(PageToken(offset.to_string()))
    }
}

/// In-memory authoritative detail payloads.
#[derive(Debug, Default)]
pub struct InMemoryDetailSource {
    details: DashMap<EntityId, EntityDetail>,
    loads: AtomicU64,
    faults: FaultPlan,
}

impl InMemoryDetailSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn put(&self, detail: EntityDetail) {
        self.details.insert(detail.entity_id, detail);
    }

    pub fn remove(&self, entity_id: EntityId) {
        self.details.remove(&entity_id);
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DetailSource for InMemoryDetailSource {
    async fn load_detail(&self, entity_id: EntityId) -> CatalogResult<Option<EntityDetail>> {
        self.faults.check(BACKEND, "load_detail").await?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.details.get(&entity_id).map(|d| d.value().clone()))
    }
}

/// Counts recorded detail views per entity.
#[derive(Debug, Default)]
pub struct InMemoryViewCounter {
    views: DashMap<EntityId, u64>,
}

impl InMemoryViewCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn views(&self, entity_id: EntityId) -> u64 {
        self.views.get(&entity_id).map(|v| *v).unwrap_or(0)
    }
}

#[async_trait]
impl ViewRecorder for InMemoryViewCounter {
    async fn record_view(&self, entity_id: EntityId) -> CatalogResult<()> {
        *self.views.entry(entity_id).or_insert(0) += 1;
        Ok(())
    }
}
