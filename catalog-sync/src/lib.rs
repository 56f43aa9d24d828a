//! Catalog Sync - Cache Coherence and Index Synchronization
//!
//! Turns committed domain events into cache actions, keeps the dirty ledger
//! that guarantees lazy invalidations converge, and rebuilds search
//! documents incrementally.
//!
//! - [`CoherencePolicy`]: event to action table
//! - [`CacheRegionStore`]: bounded region clear / key evict
//! - [`DirtyLedger`]: TTL-bounded dirty marks and the sweep
//! - [`IncrementalIndexer`]: chunked read, transform, upsert pipeline
//! - [`EmergencyOverride`]: operator-driven full invalidation
//! - [`DetailCache`]: read-through entity detail cache with repair
//!
//! Only the emergency override returns store failures to its caller.
//! Everything on the event and scheduled paths logs and moves on.

pub mod applier;
pub mod detail;
pub mod emergency;
pub mod index_sync;
pub mod indexer;
pub mod jobs;
pub mod ledger;
pub mod policy;
pub mod regions;
pub mod services;

pub use applier::{ApplierSnapshot, CoherenceApplier};
pub use detail::{DetailCache, ValidationOutcome};
pub use emergency::{EmergencyOverride, EmergencyReport, EMERGENCY_LOG_TARGET};
pub use index_sync::SearchIndexCleaner;
pub use indexer::{
    IncrementalIndexer, IndexerSnapshot, IndexerState, RunReport, RunTrigger,
};
pub use jobs::{indexer_task, sweep_task, JobMetrics, JobSnapshot};
pub use ledger::{
    BatchStatistics, BatchTypeStats, DirtyLedger, DirtyMark, LedgerSnapshot, LedgerStatus,
    SweepReport,
};
pub use policy::CoherencePolicy;
pub use regions::{CacheRegionStore, RegionSnapshot};
pub use services::{CoherenceServices, JobHandles, StoreSet};
