//! Cache region primitives with bounded store calls.

use catalog_core::{CatalogError, CatalogResult, Region};
use catalog_storage::{bounded, CacheStore, CachedValue};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Counters for region operations.
#[derive(Debug, Default)]
pub struct RegionMetrics {
    pub regions_cleared: AtomicU64,
    pub keys_evicted: AtomicU64,
    pub failures: AtomicU64,
}

/// Snapshot of region metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSnapshot {
    pub regions_cleared: u64,
    pub keys_evicted: u64,
    pub failures: u64,
}

/// Named-region clear / evict-key / clear-all over a `CacheStore`.
///
/// Every call carries the configured store timeout. Operations on regions
/// or keys that do not exist succeed.
pub struct CacheRegionStore {
    cache: Arc<dyn CacheStore>,
    timeout: Duration,
    metrics: RegionMetrics,
}

impl CacheRegionStore {
    pub fn new(cache: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self {
            cache,
            timeout,
            metrics: RegionMetrics::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    pub fn backend(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn metrics(&self) -> RegionSnapshot {
        RegionSnapshot {
            regions_cleared: self.metrics.regions_cleared.load(Ordering::Relaxed),
            keys_evicted: self.metrics.keys_evicted.load(Ordering::Relaxed),
            failures: self.metrics.failures.load(Ordering::Relaxed),
        }
    }

    fn track<T>(&self, result: &CatalogResult<T>) {
        if result.is_err() {
            self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Clear one region, returning the number of entries removed.
    pub async fn clear(&self, region: &Region) -> CatalogResult<u64> {
        let result = bounded("clear_region", self.timeout, self.cache.clear_region(region)).await;
        self.track(&result);
        if let Ok(removed) = &result {
            self.metrics.regions_cleared.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(region = %region, removed, "Cache region cleared");
        }
        result
    }

    pub async fn evict_key(&self, region: &Region, key: &str) -> CatalogResult<()> {
        let result = bounded("evict_key", self.timeout, self.cache.evict_key(region, key)).await;
        self.track(&result);
        if result.is_ok() {
            self.metrics.keys_evicted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(region = %region, key, "Cache key evicted");
        }
        result
    }

    /// Clear every listed region. All regions are attempted; the first
    /// failure is returned after the rest have run.
    pub async fn clear_all(&self, regions: &[Region]) -> CatalogResult<u64> {
        let mut removed = 0u64;
        let mut first_error: Option<CatalogError> = None;

        for region in regions {
            match self.clear(region).await {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!(region = %region, error = %e, "Failed to clear cache region");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Clear regions on a background task, for bulk clears where the caller
    /// must not wait.
    pub fn evict_async(self: &Arc<Self>, regions: Vec<Region>) -> JoinHandle<CatalogResult<u64>> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let result = store.clear_all(&regions).await;
            match &result {
                Ok(removed) => tracing::info!(
                    regions = ?regions,
                    removed,
                    "Background region clear completed"
                ),
                Err(e) => tracing::error!(
                    regions = ?regions,
                    error = %e,
                    "Background region clear failed"
                ),
            }
            result
        })
    }

    pub async fn get(&self, region: &Region, key: &str) -> CatalogResult<Option<CachedValue>> {
        bounded("cache_get", self.timeout, self.cache.get(region, key)).await
    }

    pub async fn put(&self, region: &Region, key: &str, value: Value) -> CatalogResult<()> {
        bounded("cache_put", self.timeout, self.cache.put(region, key, value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::ManualClock;
    use catalog_storage::InMemoryCacheStore;
    use serde_json::json;

    fn regions() -> (Arc<CacheRegionStore>, Arc<InMemoryCacheStore>) {
        let cache = Arc::new(InMemoryCacheStore::new(Arc::new(ManualClock::starting_now())));
        let store = Arc::new(CacheRegionStore::new(cache.clone(), Duration::from_secs(5)));
        (store, cache)
    }

    #[tokio::test]
    async fn test_clear_all_attempts_every_region() {
        let (store, cache) = regions();
        cache.faults().fail("clear_region:search-results");

        let result = store
            .clear_all(&[Region::SEARCH_RESULTS, Region::ADMIN_LISTING])
            .await;
        assert!(result.is_err());
        assert_eq!(cache.clear_count(&Region::ADMIN_LISTING), 1);
        assert_eq!(store.metrics().failures, 1);
    }

    #[tokio::test]
    async fn test_evict_async_runs_in_background() {
        let (store, cache) = regions();
        cache
            .put(&Region::SEARCH_RESULTS, "page:1", json!([]))
            .await
            .expect("put should succeed");

        let removed = store
            .evict_async(vec![Region::SEARCH_RESULTS])
            .await
            .expect("task should not panic")
            .expect("clear should succeed");
        assert_eq!(removed, 1);
        assert_eq!(cache.clear_count(&Region::SEARCH_RESULTS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let (store, cache) = regions();
        cache.faults().set_latency(Duration::from_secs(30));
        let err = store.clear(&Region::SEARCH_RESULTS).await.unwrap_err();
        assert!(err.is_transient());
    }
}
