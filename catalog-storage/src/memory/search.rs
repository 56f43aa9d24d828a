use super::{ConcurrencyGauge, FaultPlan};
use crate::traits::SearchStore;
use async_trait::async_trait;
use catalog_core::{CatalogResult, EntityId, IndexDocument};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

const BACKEND: &str = "memory-search";

/// In-memory search index with full-document replace semantics.
///
/// A fault at `"bulk_upsert:<id>"` fails any batch containing that entity.
#[derive(Debug, Default)]
pub struct InMemorySearchStore {
    documents: DashMap<EntityId, IndexDocument>,
    batches: AtomicU64,
    gauge: ConcurrencyGauge,
    faults: FaultPlan,
}

impl InMemorySearchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Peak number of concurrent `bulk_upsert` calls.
    pub fn upsert_concurrency(&self) -> &ConcurrencyGauge {
        &self.gauge
    }

    /// Number of successful `bulk_upsert` calls.
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// All documents ordered by entity id.
    pub fn snapshot(&self) -> Vec<IndexDocument> {
        let mut docs: Vec<IndexDocument> =
            self.documents.iter().map(|d| d.value().clone()).collect();
        docs.sort_by_key(|d| d.entity_id);
        docs
    }
}

#[async_trait]
impl SearchStore for InMemorySearchStore {
    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> CatalogResult<usize> {
        let _guard = self.gauge.enter();
        self.faults.check(BACKEND, "bulk_upsert").await?;
        for doc in documents {
            self.faults
                .ensure(BACKEND, &format!("bulk_upsert:{}", doc.entity_id))?;
        }

        for doc in documents {
            self.documents.insert(doc.entity_id, doc.clone());
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(documents.len())
    }

    async fn delete(&self, entity_id: EntityId) -> CatalogResult<bool> {
        self.faults.check(BACKEND, "delete").await?;
        Ok(self.documents.remove(&entity_id).is_some())
    }

    async fn get(&self, entity_id: EntityId) -> CatalogResult<Option<IndexDocument>> {
        self.faults.check(BACKEND, "get").await?;
        Ok(self.documents.get(&entity_id).map(|d| d.value().clone()))
    }
}
