//! Applies coherence actions for committed events.

use crate::ledger::DirtyLedger;
use crate::policy::CoherencePolicy;
use crate::regions::CacheRegionStore;
use async_trait::async_trait;
use catalog_core::{Action, CatalogError, CatalogResult, DomainEvent, EventEnvelope};
use catalog_events::EventSubscriber;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for applied actions.
#[derive(Debug, Default)]
pub struct ApplierMetrics {
    pub events_applied: AtomicU64,
    pub actions_applied: AtomicU64,
    pub actions_failed: AtomicU64,
}

/// Snapshot of applier metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplierSnapshot {
    pub events_applied: u64,
    pub actions_applied: u64,
    pub actions_failed: u64,
}

/// Event subscriber that runs the policy's actions against the region
/// store and the dirty ledger.
pub struct CoherenceApplier {
    regions: Arc<CacheRegionStore>,
    ledger: Arc<DirtyLedger>,
    metrics: ApplierMetrics,
}

impl CoherenceApplier {
    pub fn new(regions: Arc<CacheRegionStore>, ledger: Arc<DirtyLedger>) -> Self {
        Self {
            regions,
            ledger,
            metrics: ApplierMetrics::default(),
        }
    }

    pub fn metrics(&self) -> ApplierSnapshot {
        ApplierSnapshot {
            events_applied: self.metrics.events_applied.load(Ordering::Relaxed),
            actions_applied: self.metrics.actions_applied.load(Ordering::Relaxed),
            actions_failed: self.metrics.actions_failed.load(Ordering::Relaxed),
        }
    }

    async fn run(&self, action: &Action) -> CatalogResult<()> {
        match action {
            Action::EvictRegionNow { region } => self.regions.clear(region).await.map(|_| ()),
            Action::EvictKeyNow { region, key } => self.regions.evict_key(region, key).await,
            Action::MarkDirty { region } => self.ledger.mark_dirty(region).await,
        }
    }

    /// Run every action for `event`. A failed action does not stop the
    /// remaining ones; the first failure is returned.
    pub async fn apply(&self, event: &DomainEvent) -> CatalogResult<()> {
        let strict = CoherencePolicy::is_strict(event);
        let mut first_error: Option<CatalogError> = None;

        for action in CoherencePolicy::decide(event) {
            match self.run(&action).await {
                Ok(()) => {
                    self.metrics.actions_applied.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.metrics.actions_failed.fetch_add(1, Ordering::Relaxed);
                    if strict {
                        // Nothing else will clear this region; stale data
                        // may be visible until the entries expire.
                        tracing::error!(
                            entity_id = %event.entity_id(),
                            event = event.kind().as_str(),
                            action = %action,
                            error = %e,
                            "Strict invalidation failed"
                        );
                    } else {
                        tracing::warn!(
                            entity_id = %event.entity_id(),
                            event = event.kind().as_str(),
                            action = %action,
                            error = %e,
                            "Coherence action failed"
                        );
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        self.metrics.events_applied.fetch_add(1, Ordering::Relaxed);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventSubscriber for CoherenceApplier {
    fn name(&self) -> &str {
        "coherence-applier"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> CatalogResult<()> {
        self.apply(&envelope.event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{CoherenceConfig, EntityId, ManualClock, Region};
    use catalog_storage::{CacheStore, InMemoryCacheStore, InMemoryKeyValueStore};
    use serde_json::json;

    struct Fixture {
        applier: CoherenceApplier,
        ledger: Arc<DirtyLedger>,
        cache: Arc<InMemoryCacheStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(InMemoryCacheStore::new(clock.clone()));
        let kv = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let config = CoherenceConfig::default();
        let regions = Arc::new(CacheRegionStore::new(cache.clone(), config.store_timeout));
        let ledger = Arc::new(DirtyLedger::new(kv, regions.clone(), clock, &config));
        Fixture {
            applier: CoherenceApplier::new(regions, ledger.clone()),
            ledger,
            cache,
        }
    }

    #[tokio::test]
    async fn test_price_change_evicts_and_marks() {
        let f = fixture();
        f.cache
            .put(&Region::ENTITY_DETAIL, "42", json!({"price": 100}))
            .await
            .expect("put should succeed");

        f.applier
            .apply(&DomainEvent::price_changed(EntityId::new(42), 100, 80))
            .await
            .expect("apply should succeed");

        assert!(!f.cache.contains(&Region::ENTITY_DETAIL, "42"));
        assert_eq!(f.cache.clear_count(&Region::SEARCH_RESULTS), 1);
        assert_eq!(f.cache.clear_count(&Region::ADMIN_LISTING), 1);
        let marks = f.ledger.dirty_regions().await.expect("scan should succeed");
        assert_eq!(marks.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_leaves_no_marks() {
        let f = fixture();
        f.applier
            .apply(&DomainEvent::deleted(EntityId::new(7)))
            .await
            .expect("apply should succeed");

        assert_eq!(f.cache.eviction_count(&Region::ENTITY_DETAIL, "7"), 1);
        assert_eq!(f.cache.clear_count(&Region::SEARCH_RESULTS), 1);
        assert!(f
            .ledger
            .dirty_regions()
            .await
            .expect("scan should succeed")
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_action_does_not_skip_the_rest() {
        let f = fixture();
        f.cache.faults().fail("evict_key");

        let result = f
            .applier
            .apply(&DomainEvent::price_changed(EntityId::new(1), 10, 20))
            .await;
        assert!(result.is_err());
        assert_eq!(f.cache.clear_count(&Region::SEARCH_RESULTS), 1);
        assert_eq!(
            f.ledger
                .dirty_regions()
                .await
                .expect("scan should succeed")
                .len(),
            2
        );
        let snapshot = f.applier.metrics();
        assert_eq!(snapshot.actions_failed, 1);
        assert_eq!(snapshot.actions_applied, 4);
    }
}
