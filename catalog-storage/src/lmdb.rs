//! LMDB-backed cache region store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped cache
//! shared by every worker on one host.
//!
//! # Layout
//!
//! Keys are `region ++ 0x00 ++ key`, so clearing a region is a prefix
//! delete. Values are `[cached_at millis: 8 bytes LE][json]`; reads drop
//! entries older than the region's entry TTL.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::{CatalogResult, Clock, Region, StorageError, Timestamp};
use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use serde_json::Value;

use crate::traits::{CacheStats, CacheStore, CachedValue};

const BACKEND: &str = "lmdb";
const SEPARATOR: u8 = 0;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for catalog_core::CatalogError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Serialization(reason) => StorageError::Serialization { reason }.into(),
            other => StorageError::OperationFailed {
                operation: BACKEND.to_string(),
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

fn region_prefix(region: &Region) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(region.as_str().len() + 1);
    prefix.extend_from_slice(region.as_str().as_bytes());
    prefix.push(SEPARATOR);
    prefix
}

fn encode_key(region: &Region, key: &str) -> Vec<u8> {
    let mut encoded = region_prefix(region);
    encoded.extend_from_slice(key.as_bytes());
    encoded
}

fn encode_value(value: &Value, cached_at: Timestamp) -> Result<Vec<u8>, LmdbCacheError> {
    let body =
        serde_json::to_vec(value).map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;
    let mut bytes = Vec::with_capacity(8 + body.len());
    bytes.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn decode_value(bytes: &[u8]) -> Result<Option<CachedValue>, LmdbCacheError> {
    if bytes.len() < 8 {
        return Ok(None);
    }
    let mut millis = [0u8; 8];
    millis.copy_from_slice(&bytes[0..8]);
    let Some(cached_at) = DateTime::from_timestamp_millis(i64::from_le_bytes(millis)) else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes[8..])
        .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;
    Ok(Some(CachedValue { value, cached_at }))
}

/// LMDB-backed region cache.
pub struct LmdbRegionStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LmdbRegionStore {
    /// Open (or create) the cache under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        tracing::info!(path = %path.as_ref().display(), max_size_mb, "LMDB cache opened");

        Ok(Self {
            env,
            db,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut keys = Vec::new();
        for entry in self.db.prefix_iter(&rtxn, prefix).map_err(txn_err)? {
            let (key, _) = entry.map_err(txn_err)?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    fn delete_keys(&self, keys: &[Vec<u8>]) -> Result<u64, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn is_expired(&self, region: &Region, entry: &CachedValue) -> bool {
        let ttl = chrono::Duration::from_std(region.entry_ttl()).unwrap_or(chrono::Duration::MAX);
        self.clock.now().signed_duration_since(entry.cached_at) >= ttl
    }
}

#[async_trait]
impl CacheStore for LmdbRegionStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, region: &Region, key: &str) -> CatalogResult<Option<CachedValue>> {
        let encoded = encode_key(region, key);
        let found = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, &encoded).map_err(txn_err)? {
                Some(bytes) => decode_value(bytes)?,
                None => None,
            }
        };

        match found {
            Some(entry) if !self.is_expired(region, &entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry))
            }
            Some(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.delete_keys(&[encoded])?;
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(&self, region: &Region, key: &str, value: Value) -> CatalogResult<()> {
        let bytes = encode_value(&value, self.clock.now())?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, &encode_key(region, key), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn evict_key(&self, region: &Region, key: &str) -> CatalogResult<()> {
        let deleted = self.delete_keys(&[encode_key(region, key)])?;
        self.evictions.fetch_add(deleted, Ordering::Relaxed);
        Ok(())
    }

    async fn clear_region(&self, region: &Region) -> CatalogResult<u64> {
        let keys = self.collect_keys_with_prefix(&region_prefix(region))?;
        let deleted = self.delete_keys(&keys)?;
        self.evictions.fetch_add(deleted, Ordering::Relaxed);
        tracing::debug!(region = %region, deleted, "LMDB region cleared");
        Ok(deleted)
    }

    async fn stats(&self) -> CatalogResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_err)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }
}
