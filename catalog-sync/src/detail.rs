//! Read-through cache for entity detail payloads.
//!
//! `detail_for_view` is the outer call made by the read path: it records a
//! view and then calls `cached_detail`, the inner cache-checked lookup. The
//! two are plain sequential calls so the lookup is always cache-checked.

use crate::regions::CacheRegionStore;
use catalog_core::{CatalogError, CatalogResult, EntityDetail, EntityId, Region, StorageError};
use catalog_storage::{bounded, DetailSource, ViewRecorder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Result of checking one cached detail entry against the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Nothing cached for the entity.
    NotCached,
    /// Cached entry matches the source.
    Consistent,
    /// Cached entry was stale or unreadable and has been overwritten.
    Repaired,
    /// Entity no longer exists; the cached entry was removed.
    Evicted,
}

pub struct DetailCache {
    regions: Arc<CacheRegionStore>,
    source: Arc<dyn DetailSource>,
    views: Arc<dyn ViewRecorder>,
    timeout: Duration,
}

fn decode(entity_id: EntityId, value: serde_json::Value) -> Option<EntityDetail> {
    match serde_json::from_value(value) {
        Ok(detail) => Some(detail),
        Err(e) => {
            tracing::warn!(entity_id = %entity_id, error = %e, "Unreadable cached detail entry");
            None
        }
    }
}

fn encode(detail: &EntityDetail) -> CatalogResult<serde_json::Value> {
    serde_json::to_value(detail).map_err(|e| {
        CatalogError::from(StorageError::Serialization {
            reason: e.to_string(),
        })
    })
}

impl DetailCache {
    pub fn new(
        regions: Arc<CacheRegionStore>,
        source: Arc<dyn DetailSource>,
        views: Arc<dyn ViewRecorder>,
        timeout: Duration,
    ) -> Self {
        Self {
            regions,
            source,
            views,
            timeout,
        }
    }

    /// Record a view, then return the (possibly cached) detail.
    pub async fn detail_for_view(&self, entity_id: EntityId) -> CatalogResult<Option<EntityDetail>> {
        if let Err(e) = bounded("record_view", self.timeout, self.views.record_view(entity_id)).await {
            tracing::warn!(entity_id = %entity_id, error = %e, "Failed to record view");
        }
        self.cached_detail(entity_id).await
    }

    /// Cache-checked lookup. Cache errors fall through to the source;
    /// entities the source does not know are never cached.
    pub async fn cached_detail(&self, entity_id: EntityId) -> CatalogResult<Option<EntityDetail>> {
        let key = entity_id.cache_key();

        match self.regions.get(&Region::ENTITY_DETAIL, &key).await {
            Ok(Some(cached)) => {
                if let Some(detail) = decode(entity_id, cached.value) {
                    return Ok(Some(detail));
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(entity_id = %entity_id, error = %e, "Detail cache read failed");
            }
        }

        let loaded = self.load(entity_id).await?;
        if let Some(detail) = &loaded {
            let stored = match encode(detail) {
                Ok(value) => self.regions.put(&Region::ENTITY_DETAIL, &key, value).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                tracing::warn!(entity_id = %entity_id, error = %e, "Detail cache write failed");
            }
        }
        Ok(loaded)
    }

    /// Compare the cached entry with the source and fix it if they differ.
    pub async fn validate_and_repair(&self, entity_id: EntityId) -> CatalogResult<ValidationOutcome> {
        let key = entity_id.cache_key();
        let Some(cached) = self.regions.get(&Region::ENTITY_DETAIL, &key).await? else {
            return Ok(ValidationOutcome::NotCached);
        };

        let outcome = match self.load(entity_id).await? {
            None => {
                self.regions.evict_key(&Region::ENTITY_DETAIL, &key).await?;
                ValidationOutcome::Evicted
            }
            Some(fresh) => match decode(entity_id, cached.value) {
                Some(current) if current.updated_at == fresh.updated_at => {
                    ValidationOutcome::Consistent
                }
                _ => {
                    self.regions
                        .put(&Region::ENTITY_DETAIL, &key, encode(&fresh)?)
                        .await?;
                    ValidationOutcome::Repaired
                }
            },
        };

        if outcome != ValidationOutcome::Consistent {
            tracing::info!(entity_id = %entity_id, ?outcome, "Detail cache entry repaired");
        }
        Ok(outcome)
    }

    async fn load(&self, entity_id: EntityId) -> CatalogResult<Option<EntityDetail>> {
        bounded("load_detail", self.timeout, self.source.load_detail(entity_id)).await
    }
}
