//! Catalog Storage - Store Boundaries
//!
//! Traits for every external store the coherence core drives, in-memory
//! implementations for tests and single-process use, and an LMDB-backed
//! cache region store.

pub mod lmdb;
pub mod memory;
pub mod timeout;
pub mod traits;

pub use lmdb::{LmdbCacheError, LmdbRegionStore};
pub use memory::{
    ConcurrencyGauge, FaultPlan, InMemoryCacheStore, InMemoryDetailSource,
    InMemoryKeyValueStore, InMemoryPrimaryStore, InMemorySearchStore, InMemoryViewCounter,
    ALL_OPERATIONS,
};
pub use timeout::bounded;
pub use traits::{
    CacheStats, CacheStore, CachedValue, ChangedPage, DetailSource, KeyValueStore, PageToken,
    PrimaryStore, SearchStore, ViewRecorder,
};
