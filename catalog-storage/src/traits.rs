//! Boundary traits for the stores the coherence core drives.
//!
//! Implementations are collaborators: a remote cache, a TTL key-value
//! store, a search engine, the relational primary store. The core only
//! relies on the contracts documented here.

use async_trait::async_trait;
use catalog_core::{
    CatalogResult, ChangedRow, EntityDetail, EntityId, IndexDocument, Region, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// CACHE STORE
// ============================================================================

/// A cached value with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    pub value: Value,
    pub cached_at: Timestamp,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including expired entries).
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of entries removed by key eviction or region clear.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate.
    ///
    /// Returns a value between 0.0 and 1.0, or 0.0 if there have been no
    /// requests.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Region-addressed cache.
///
/// `evict_key` and `clear_region` are existence-agnostic: removing
/// something that is not there succeeds.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend identifier for status output.
    fn backend_name(&self) -> &'static str;

    /// Read an entry, honouring the region's entry TTL.
    async fn get(&self, region: &Region, key: &str) -> CatalogResult<Option<CachedValue>>;

    async fn put(&self, region: &Region, key: &str, value: Value) -> CatalogResult<()>;

    async fn evict_key(&self, region: &Region, key: &str) -> CatalogResult<()>;

    /// Remove every entry in the region, returning how many were removed.
    async fn clear_region(&self, region: &Region) -> CatalogResult<u64>;

    async fn stats(&self) -> CatalogResult<CacheStats>;
}

// ============================================================================
// TTL KEY-VALUE STORE
// ============================================================================

/// Shared key-value store with per-key expiry and hash fields.
///
/// Plain values and hashes share one key space; using a hash operation on a
/// plain key fails with `StorageError::WrongType`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CatalogResult<()>;

    async fn get(&self, key: &str) -> CatalogResult<Option<String>>;

    async fn exists(&self, key: &str) -> CatalogResult<bool>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> CatalogResult<bool>;

    async fn scan_keys_by_prefix(&self, prefix: &str) -> CatalogResult<Vec<String>>;

    /// Atomically add `n` to a hash field, creating key and field as needed.
    async fn hash_increment(&self, key: &str, field: &str, n: i64) -> CatalogResult<i64>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CatalogResult<()>;

    async fn hash_get_all(&self, key: &str) -> CatalogResult<BTreeMap<String, String>>;

    /// Set a TTL on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CatalogResult<bool>;
}

// ============================================================================
// SEARCH STORE
// ============================================================================

/// Denormalized search index keyed by entity id.
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Replace each document wholesale. Returns the number written.
    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> CatalogResult<usize>;

    /// Returns whether a document was removed.
    async fn delete(&self, entity_id: EntityId) -> CatalogResult<bool>;

    async fn get(&self, entity_id: EntityId) -> CatalogResult<Option<IndexDocument>>;
}

// ============================================================================
// PRIMARY STORE
// ============================================================================

/// Opaque continuation token returned by `find_changed_since`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(pub String);

/// One page of changed rows.
#[derive(Debug, Clone, Default)]
pub struct ChangedPage {
    pub rows: Vec<ChangedRow>,
    pub next_page_token: Option<PageToken>,
}

/// Change feed over the authoritative store.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Rows whose last-modified timestamp is `>= since`, ordered by
    /// last-modified ascending.
    async fn find_changed_since(
        &self,
        since: Timestamp,
        page_size: usize,
        page_token: Option<PageToken>,
    ) -> CatalogResult<ChangedPage>;

    /// Token addressing page `page_index` directly, without reading the
    /// pages before it. Stores whose tokens are cursors return `None`, and
    /// their pages are then read one after another.
    fn page_token_at(&self, _page_index: u64, _page_size: usize) -> Option<PageToken> {
        None
    }
}

// ============================================================================
// DETAIL SOURCE / VIEW RECORDER
// ============================================================================

/// Loads the authoritative detail payload for one entity.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn load_detail(&self, entity_id: EntityId) -> CatalogResult<Option<EntityDetail>>;
}

/// Records a detail view for the entity's statistics block.
#[async_trait]
pub trait ViewRecorder: Send + Sync {
    async fn record_view(&self, entity_id: EntityId) -> CatalogResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
