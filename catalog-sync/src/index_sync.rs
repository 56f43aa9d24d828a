//! Removes deleted entities from the search index.
//!
//! The indexer only ever upserts rows that still exist, so without this
//! subscriber a deleted entity's document would stay searchable.

use async_trait::async_trait;
use catalog_core::{CatalogResult, DomainEvent, EntityId, EventEnvelope};
use catalog_events::EventSubscriber;
use catalog_storage::{bounded, SearchStore};
use std::sync::Arc;
use std::time::Duration;

pub struct SearchIndexCleaner {
    search: Arc<dyn SearchStore>,
    timeout: Duration,
}

impl SearchIndexCleaner {
    pub fn new(search: Arc<dyn SearchStore>, timeout: Duration) -> Self {
        Self { search, timeout }
    }

    /// Remove the document for `entity_id`. Absent documents are not an error.
    pub async fn remove(&self, entity_id: EntityId) -> CatalogResult<bool> {
        let removed = bounded("search_delete", self.timeout, self.search.delete(entity_id)).await?;
        tracing::debug!(entity_id = %entity_id, removed, "Search document removed");
        Ok(removed)
    }
}

#[async_trait]
impl EventSubscriber for SearchIndexCleaner {
    fn name(&self) -> &str {
        "search-index-cleaner"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> CatalogResult<()> {
        if let DomainEvent::Deleted { entity_id } = &envelope.event {
            self.remove(*entity_id).await?;
        }
        Ok(())
    }
}
