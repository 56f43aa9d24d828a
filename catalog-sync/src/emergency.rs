//! Emergency Override
//!
//! Operator-driven full invalidation for incident response. Unlike the
//! scheduled paths, every step must succeed and any store error is returned
//! to the caller.

use crate::ledger::{DirtyLedger, SweepReport};
use crate::regions::CacheRegionStore;
use catalog_core::{CatalogResult, Clock, EntityId, Region, Timestamp};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Log target for emergency override records.
pub const EMERGENCY_LOG_TARGET: &str = "catalog::emergency";

/// What an emergency eviction touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmergencyReport {
    pub entity_id: EntityId,
    pub reason: String,
    pub timestamp: Timestamp,
    pub affected_regions: Vec<Region>,
    pub sweep: SweepReport,
}

pub struct EmergencyOverride {
    regions: Arc<CacheRegionStore>,
    ledger: Arc<DirtyLedger>,
    search_regions: Vec<Region>,
    clock: Arc<dyn Clock>,
    invocations: AtomicU64,
}

impl EmergencyOverride {
    pub fn new(
        regions: Arc<CacheRegionStore>,
        ledger: Arc<DirtyLedger>,
        search_regions: Vec<Region>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            regions,
            ledger,
            search_regions,
            clock,
            invocations: AtomicU64::new(0),
        }
    }

    /// Number of completed emergency evictions.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Evict the entity's detail entry, clear every search and listing
    /// region, drain the dirty ledger, then emit one error-level record.
    ///
    /// Stops at the first failing step.
    pub async fn emergency_evict(
        &self,
        entity_id: EntityId,
        reason: &str,
    ) -> CatalogResult<EmergencyReport> {
        self.regions
            .evict_key(&Region::ENTITY_DETAIL, &entity_id.cache_key())
            .await?;
        self.regions.clear_all(&self.search_regions).await?;
        let sweep = self.ledger.sweep_now().await?;

        let mut affected_regions = Vec::with_capacity(self.search_regions.len() + 1);
        affected_regions.push(Region::ENTITY_DETAIL);
        for region in self.search_regions.iter().chain(&sweep.cleared_regions) {
            if !affected_regions.contains(region) {
                affected_regions.push(region.clone());
            }
        }

        let timestamp = self.clock.now();
        let names: Vec<&str> = affected_regions.iter().map(Region::as_str).collect();
        tracing::error!(
            target: EMERGENCY_LOG_TARGET,
            entity_id = %entity_id,
            reason,
            timestamp = %timestamp.to_rfc3339(),
            affected_regions = ?names,
            "Emergency cache eviction executed"
        );

        self.invocations.fetch_add(1, Ordering::Relaxed);
        Ok(EmergencyReport {
            entity_id,
            reason: reason.to_string(),
            timestamp,
            affected_regions,
            sweep,
        })
    }
}
