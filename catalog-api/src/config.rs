//! Server configuration and store bootstrap.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use catalog_core::{Clock, CoherenceConfig};
use catalog_storage::{
    CacheStore, InMemoryCacheStore, InMemoryDetailSource, InMemoryKeyValueStore,
    InMemoryPrimaryStore, InMemorySearchStore, InMemoryViewCounter, LmdbRegionStore,
};
use catalog_sync::StoreSet;

use crate::error::{ApiError, ApiResult};

const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "3000";
const DEFAULT_CACHE_MAX_SIZE_MB: usize = 256;

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// LMDB directory for the cache regions; in-memory when `None`.
    pub cache_path: Option<PathBuf>,
    pub cache_max_size_mb: usize,
    pub coherence: CoherenceConfig,
}

impl ApiConfig {
    /// Build the configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CATALOG_API_BIND` (default: 0.0.0.0)
    /// - `PORT`, then `CATALOG_API_PORT` (default: 3000)
    /// - `CATALOG_CACHE_PATH` (default: unset, in-memory cache)
    /// - `CATALOG_CACHE_MAX_SIZE_MB` (default: 256)
    /// - everything read by [`CoherenceConfig::from_env`]
    pub fn from_env() -> ApiResult<Self> {
        let host = std::env::var("CATALOG_API_BIND").ok();
        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("CATALOG_API_PORT").ok());
        let bind_addr = parse_bind_addr(host.as_deref(), port.as_deref())?;

        let cache_path = std::env::var("CATALOG_CACHE_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let cache_max_size_mb = std::env::var("CATALOG_CACHE_MAX_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_MAX_SIZE_MB);

        let coherence = CoherenceConfig::from_env();
        coherence.validate()?;

        Ok(Self {
            bind_addr,
            cache_path,
            cache_max_size_mb,
            coherence,
        })
    }

    /// Open the configured cache backend and pair it with the in-process
    /// key-value, search, primary and detail stores.
    pub fn store_set(&self, clock: Arc<dyn Clock>) -> ApiResult<StoreSet> {
        let cache: Arc<dyn CacheStore> = match &self.cache_path {
            Some(path) => Arc::new(
                LmdbRegionStore::open(path, self.cache_max_size_mb, Arc::clone(&clock)).map_err(
                    |e| {
                        ApiError::internal_error(format!(
                            "Failed to open cache at {}: {}",
                            path.display(),
                            e
                        ))
                    },
                )?,
            ),
            None => Arc::new(InMemoryCacheStore::new(Arc::clone(&clock))),
        };

        Ok(StoreSet {
            cache,
            kv: Arc::new(InMemoryKeyValueStore::new(clock)),
            search: Arc::new(InMemorySearchStore::new()),
            primary: Arc::new(InMemoryPrimaryStore::new()),
            details: Arc::new(InMemoryDetailSource::new()),
            views: Arc::new(InMemoryViewCounter::new()),
        })
    }
}

/// Resolve a bind address from optional host and port strings.
pub fn parse_bind_addr(host: Option<&str>, port: Option<&str>) -> ApiResult<SocketAddr> {
    let host = host.unwrap_or(DEFAULT_BIND_HOST);
    let port_str = port.unwrap_or(DEFAULT_PORT);
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
