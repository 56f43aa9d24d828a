//! Coherence and indexer configuration

use crate::constants::*;
use crate::error::{CatalogError, CatalogResult, ConfigError};
use crate::region::Region;
use std::time::Duration;

/// Tunables for the dirty ledger, the incremental indexer and the event
/// workers.
#[derive(Debug, Clone, PartialEq)]
pub struct CoherenceConfig {
    /// Lifetime of a dirty mark before it silently expires.
    pub dirty_mark_ttl: Duration,

    /// How often the dirty ledger is swept.
    pub sweep_interval: Duration,

    /// How long per-day batch statistics are retained.
    pub batch_stats_retention: Duration,

    /// How often the incremental indexer runs.
    pub indexer_interval: Duration,

    /// Look-back window used as the indexer's lower bound.
    /// Must cover the maximum clock skew between writers and the indexer.
    pub overlap_window: Duration,

    /// Rows per chunk.
    pub chunk_size: usize,

    /// Concurrent chunk fetches against the primary store.
    pub reader_concurrency: usize,

    /// Concurrent chunk steps against the search store.
    pub throttle_limit: usize,

    /// Timeout applied to each external store call.
    pub store_timeout: Duration,

    /// Concurrently running event subscriber calls.
    pub event_workers: usize,

    /// Regions cleared by the emergency override besides the detail key.
    pub search_regions: Vec<Region>,

    /// Whether the scheduled indexer runs at all.
    pub indexer_enabled: bool,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            dirty_mark_ttl: Duration::from_secs(DEFAULT_DIRTY_MARK_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            batch_stats_retention: Duration::from_secs(
                DEFAULT_BATCH_STATS_RETENTION_DAYS * 24 * 60 * 60,
            ),
            indexer_interval: Duration::from_secs(DEFAULT_INDEXER_INTERVAL_SECS),
            overlap_window: Duration::from_secs(DEFAULT_OVERLAP_WINDOW_SECS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            reader_concurrency: DEFAULT_READER_CONCURRENCY,
            throttle_limit: DEFAULT_THROTTLE_LIMIT,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            event_workers: DEFAULT_EVENT_WORKERS,
            search_regions: vec![Region::SEARCH_RESULTS, Region::ADMIN_LISTING],
            indexer_enabled: true,
        }
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl CoherenceConfig {
    /// Create CoherenceConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CATALOG_DIRTY_MARK_TTL_SECS` (default: 3600)
    /// - `CATALOG_SWEEP_INTERVAL_SECS` (default: 300)
    /// - `CATALOG_BATCH_STATS_RETENTION_DAYS` (default: 7)
    /// - `CATALOG_INDEXER_INTERVAL_SECS` (default: 120)
    /// - `CATALOG_OVERLAP_WINDOW_SECS` (default: 300)
    /// - `CATALOG_INDEXER_CHUNK_SIZE` (default: 200)
    /// - `CATALOG_INDEXER_READERS` (default: 4)
    /// - `CATALOG_INDEXER_THROTTLE` (default: 4)
    /// - `CATALOG_STORE_TIMEOUT_SECS` (default: 5)
    /// - `CATALOG_EVENT_WORKERS` (default: 10)
    /// - `CATALOG_SEARCH_REGIONS` comma-separated (default: search-results,admin-listing)
    /// - `CATALOG_INDEXER_ENABLED` (default: true)
    pub fn from_env() -> Self {
        let retention_days = std::env::var("CATALOG_BATCH_STATS_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_BATCH_STATS_RETENTION_DAYS);

        let search_regions = std::env::var("CATALOG_SEARCH_REGIONS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Region::from)
                    .collect::<Vec<_>>()
            })
            .filter(|regions| !regions.is_empty())
            .unwrap_or_else(|| vec![Region::SEARCH_RESULTS, Region::ADMIN_LISTING]);

        let indexer_enabled = std::env::var("CATALOG_INDEXER_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            dirty_mark_ttl: env_secs("CATALOG_DIRTY_MARK_TTL_SECS", DEFAULT_DIRTY_MARK_TTL_SECS),
            sweep_interval: env_secs("CATALOG_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
            batch_stats_retention: Duration::from_secs(retention_days * 24 * 60 * 60),
            indexer_interval: env_secs(
                "CATALOG_INDEXER_INTERVAL_SECS",
                DEFAULT_INDEXER_INTERVAL_SECS,
            ),
            overlap_window: env_secs("CATALOG_OVERLAP_WINDOW_SECS", DEFAULT_OVERLAP_WINDOW_SECS),
            chunk_size: env_usize("CATALOG_INDEXER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            reader_concurrency: env_usize("CATALOG_INDEXER_READERS", DEFAULT_READER_CONCURRENCY),
            throttle_limit: env_usize("CATALOG_INDEXER_THROTTLE", DEFAULT_THROTTLE_LIMIT),
            store_timeout: env_secs("CATALOG_STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT_SECS),
            event_workers: env_usize("CATALOG_EVENT_WORKERS", DEFAULT_EVENT_WORKERS),
            search_regions,
            indexer_enabled,
        }
    }

    /// Short intervals for local development.
    pub fn development() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            indexer_interval: Duration::from_secs(15),
            overlap_window: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// Returns Ok(()) if valid, Err(CatalogError::Config) if invalid.
    pub fn validate(&self) -> CatalogResult<()> {
        let positive_durations = [
            ("dirty_mark_ttl", self.dirty_mark_ttl),
            ("sweep_interval", self.sweep_interval),
            ("indexer_interval", self.indexer_interval),
            ("store_timeout", self.store_timeout),
        ];
        for (field, value) in positive_durations {
            if value.is_zero() {
                return Err(invalid(field, "0s", "must be greater than zero"));
            }
        }

        let positive_sizes = [
            ("chunk_size", self.chunk_size),
            ("reader_concurrency", self.reader_concurrency),
            ("throttle_limit", self.throttle_limit),
            ("event_workers", self.event_workers),
        ];
        for (field, value) in positive_sizes {
            if value == 0 {
                return Err(invalid(field, "0", "must be greater than zero"));
            }
        }

        if self.overlap_window < self.indexer_interval {
            return Err(invalid(
                "overlap_window",
                &format!("{}s", self.overlap_window.as_secs()),
                "must be at least the indexer interval or rows can be skipped",
            ));
        }

        if self.search_regions.is_empty() {
            return Err(CatalogError::Config(ConfigError::MissingRequired {
                field: "search_regions".to_string(),
            }));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> CatalogError {
    CatalogError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}
