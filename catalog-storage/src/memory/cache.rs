use super::FaultPlan;
use crate::traits::{CacheStats, CacheStore, CachedValue};
use async_trait::async_trait;
use catalog_core::{CatalogResult, Clock, Region};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const BACKEND: &str = "memory";

/// Region-partitioned in-memory cache.
///
/// Besides the cache itself it counts region clears and key evictions so
/// tests can assert exactly what the coherence layer did.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    regions: DashMap<Region, HashMap<String, CachedValue>>,
    clears: DashMap<Region, u64>,
    key_evictions: DashMap<(Region, String), u64>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    clock: Arc<dyn Clock>,
    faults: FaultPlan,
}

impl InMemoryCacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            regions: DashMap::new(),
            clears: DashMap::new(),
            key_evictions: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            clock,
            faults: FaultPlan::default(),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Number of `clear_region` calls that succeeded for `region`.
    pub fn clear_count(&self, region: &Region) -> u64 {
        self.clears.get(region).map(|c| *c).unwrap_or(0)
    }

    /// Number of successful `evict_key` calls for `(region, key)`.
    pub fn eviction_count(&self, region: &Region, key: &str) -> u64 {
        self.key_evictions
            .get(&(region.clone(), key.to_string()))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Whether a live (unexpired) entry exists, without touching hit stats.
    pub fn contains(&self, region: &Region, key: &str) -> bool {
        let now = self.clock.now();
        self.regions
            .get(region)
            .and_then(|entries| entries.get(key).map(|e| !is_expired(region, e, now)))
            .unwrap_or(false)
    }

    pub fn entry_count(&self, region: &Region) -> usize {
        self.regions.get(region).map(|e| e.len()).unwrap_or(0)
    }
}

fn is_expired(region: &Region, entry: &CachedValue, now: catalog_core::Timestamp) -> bool {
    let ttl = chrono::Duration::from_std(region.entry_ttl()).unwrap_or(chrono::Duration::MAX);
    now.signed_duration_since(entry.cached_at) >= ttl
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, region: &Region, key: &str) -> CatalogResult<Option<CachedValue>> {
        self.faults.check(BACKEND, &format!("get:{region}")).await?;
        let now = self.clock.now();

        let found = match self.regions.get_mut(region) {
            Some(mut entries) => match entries.get(key) {
                Some(entry) if is_expired(region, entry, now) => {
                    entries.remove(key);
                    None
                }
                Some(entry) => Some(entry.clone()),
                None => None,
            },
            None => None,
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn put(&self, region: &Region, key: &str, value: Value) -> CatalogResult<()> {
        self.faults.check(BACKEND, &format!("put:{region}")).await?;
        let entry = CachedValue {
            value,
            cached_at: self.clock.now(),
        };
        self.regions
            .entry(region.clone())
            .or_default()
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn evict_key(&self, region: &Region, key: &str) -> CatalogResult<()> {
        self.faults
            .check(BACKEND, &format!("evict_key:{region}"))
            .await?;
        if let Some(mut entries) = self.regions.get_mut(region) {
            if entries.remove(key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        *self
            .key_evictions
            .entry((region.clone(), key.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn clear_region(&self, region: &Region) -> CatalogResult<u64> {
        self.faults
            .check(BACKEND, &format!("clear_region:{region}"))
            .await?;
        let removed = self
            .regions
            .remove(region)
            .map(|(_, entries)| entries.len() as u64)
            .unwrap_or(0);
        self.evictions.fetch_add(removed, Ordering::Relaxed);
        *self.clears.entry(region.clone()).or_insert(0) += 1;
        Ok(removed)
    }

    async fn stats(&self) -> CatalogResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.regions.iter().map(|r| r.len() as u64).sum(),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    fn store() -> (InMemoryCacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (InMemoryCacheStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_clear_missing_region_is_noop() {
        let (store, _) = store();
        let removed = store
            .clear_region(&Region::new("never-written"))
            .await
            .expect("clear should succeed");
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_entries_expire_with_region_ttl() {
        let (store, clock) = store();
        store
            .put(&Region::ENTITY_DETAIL, "1", json!({"name": "a"}))
            .await
            .expect("put should succeed");
        assert!(store.contains(&Region::ENTITY_DETAIL, "1"));

        clock.advance(Duration::from_secs(15 * 60));
        let cached = store
            .get(&Region::ENTITY_DETAIL, "1")
            .await
            .expect("get should succeed");
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_injected_clear_failure() {
        let (store, _) = store();
        store.faults().fail("clear_region:search-results");
        assert!(store.clear_region(&Region::SEARCH_RESULTS).await.is_err());
        assert!(store.clear_region(&Region::ADMIN_LISTING).await.is_ok());
        assert_eq!(store.clear_count(&Region::SEARCH_RESULTS), 0);
        assert_eq!(store.clear_count(&Region::ADMIN_LISTING), 1);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_evictions() {
        let (store, _) = store();
        store
            .put(&Region::SEARCH_RESULTS, "page:1", json!([1, 2]))
            .await
            .expect("put should succeed");
        let _ = store.get(&Region::SEARCH_RESULTS, "page:1").await;
        let _ = store.get(&Region::SEARCH_RESULTS, "page:2").await;
        store
            .clear_region(&Region::SEARCH_RESULTS)
            .await
            .expect("clear should succeed");

        let stats = store.stats().await.expect("stats should succeed");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entry_count, 0);
    }
}
