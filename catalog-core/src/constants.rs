//! Constants for catalog cache coherence
//!
//! Defaults for every tunable live here so configuration, jobs and tests
//! agree on the same numbers.

// ============================================================================
// DIRTY LEDGER
// ============================================================================

/// Lifetime of a dirty mark (1 hour)
pub const DEFAULT_DIRTY_MARK_TTL_SECS: u64 = 3600;

/// Interval between dirty-ledger sweeps (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Days of batch statistics kept in the key-value store
pub const DEFAULT_BATCH_STATS_RETENTION_DAYS: u64 = 7;

/// Key prefix for dirty marks; the region name is appended
pub const DIRTY_MARK_PREFIX: &str = "cache:dirty:search:";

/// Key prefix for per-day batch statistics; `YYYY-MM-DD` is appended
pub const BATCH_STATS_PREFIX: &str = "cache:batch_stats:";

/// Batch type recorded by the dirty-ledger sweep
pub const SEARCH_CACHE_BATCH_TYPE: &str = "search_cache";

// ============================================================================
// INCREMENTAL INDEXER
// ============================================================================

/// Interval between indexer runs (2 minutes)
pub const DEFAULT_INDEXER_INTERVAL_SECS: u64 = 120;

/// Look-back window for changed rows (5 minutes)
pub const DEFAULT_OVERLAP_WINDOW_SECS: u64 = 300;

/// Rows fetched and written per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Maximum concurrent chunk fetches against the primary store
pub const DEFAULT_READER_CONCURRENCY: usize = 4;

/// Maximum concurrent chunk steps against the search store
pub const DEFAULT_THROTTLE_LIMIT: usize = 4;

// ============================================================================
// STORES AND WORKERS
// ============================================================================

/// Timeout applied to every external store call
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;

/// Maximum concurrently running event subscriber calls
pub const DEFAULT_EVENT_WORKERS: usize = 10;

// ============================================================================
// CACHE REGION ENTRY TTLS
// ============================================================================

/// Entity detail entries (15 minutes)
pub const ENTITY_DETAIL_TTL_SECS: u64 = 15 * 60;

/// Search result entries (30 minutes)
pub const SEARCH_RESULTS_TTL_SECS: u64 = 30 * 60;

/// Admin listing entries (6 hours)
pub const ADMIN_LISTING_TTL_SECS: u64 = 6 * 60 * 60;

/// Any other region (10 minutes)
pub const DEFAULT_REGION_TTL_SECS: u64 = 10 * 60;
