//! Wiring of the coherence components over one set of stores.

use crate::applier::CoherenceApplier;
use crate::detail::DetailCache;
use crate::emergency::EmergencyOverride;
use crate::index_sync::SearchIndexCleaner;
use crate::indexer::IncrementalIndexer;
use crate::jobs::{indexer_task, sweep_task, JobMetrics};
use crate::ledger::DirtyLedger;
use crate::regions::CacheRegionStore;
use catalog_core::{Clock, CoherenceConfig, EventKind};
use catalog_events::DispatcherBuilder;
use catalog_storage::{
    CacheStore, DetailSource, KeyValueStore, PrimaryStore, SearchStore, ViewRecorder,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The external stores the coherence core drives.
#[derive(Clone)]
pub struct StoreSet {
    pub cache: Arc<dyn CacheStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub search: Arc<dyn SearchStore>,
    pub primary: Arc<dyn PrimaryStore>,
    pub details: Arc<dyn DetailSource>,
    pub views: Arc<dyn ViewRecorder>,
}

/// Handles to the spawned background jobs.
pub struct JobHandles {
    pub sweep: JoinHandle<Arc<JobMetrics>>,
    pub indexer: Option<JoinHandle<Arc<JobMetrics>>>,
}

/// Every coherence component, built once and shared.
#[derive(Clone)]
pub struct CoherenceServices {
    pub config: CoherenceConfig,
    pub clock: Arc<dyn Clock>,
    pub regions: Arc<CacheRegionStore>,
    pub ledger: Arc<DirtyLedger>,
    pub applier: Arc<CoherenceApplier>,
    pub indexer: Arc<IncrementalIndexer>,
    pub emergency: Arc<EmergencyOverride>,
    pub details: Arc<DetailCache>,
    pub cleaner: Arc<SearchIndexCleaner>,
    pub sweep_metrics: Arc<JobMetrics>,
    pub indexer_metrics: Arc<JobMetrics>,
}

impl CoherenceServices {
    pub fn new(stores: StoreSet, config: CoherenceConfig, clock: Arc<dyn Clock>) -> Self {
        let timeout = config.store_timeout;
        let regions = Arc::new(CacheRegionStore::new(stores.cache, timeout));
        let ledger = Arc::new(DirtyLedger::new(
            stores.kv,
            Arc::clone(&regions),
            Arc::clone(&clock),
            &config,
        ));
        let applier = Arc::new(CoherenceApplier::new(
            Arc::clone(&regions),
            Arc::clone(&ledger),
        ));
        let indexer = Arc::new(IncrementalIndexer::new(
            stores.primary,
            Arc::clone(&stores.search),
            Arc::clone(&clock),
            &config,
        ));
        let emergency = Arc::new(EmergencyOverride::new(
            Arc::clone(&regions),
            Arc::clone(&ledger),
            config.search_regions.clone(),
            Arc::clone(&clock),
        ));
        let details = Arc::new(DetailCache::new(
            Arc::clone(&regions),
            stores.details,
            stores.views,
            timeout,
        ));
        let cleaner = Arc::new(SearchIndexCleaner::new(stores.search, timeout));

        Self {
            config,
            clock,
            regions,
            ledger,
            applier,
            indexer,
            emergency,
            details,
            cleaner,
            sweep_metrics: Arc::new(JobMetrics::new()),
            indexer_metrics: Arc::new(JobMetrics::new()),
        }
    }

    /// Dispatcher builder with the coherence subscribers registered.
    pub fn dispatcher_builder(&self) -> DispatcherBuilder {
        DispatcherBuilder::new()
            .workers(self.config.event_workers)
            .clock(Arc::clone(&self.clock))
            .subscribe_all(self.applier.clone())
            .subscribe(EventKind::Deleted, self.cleaner.clone())
    }

    /// Spawn the sweep job, and the indexer job when enabled.
    pub fn spawn_jobs(&self, shutdown_rx: watch::Receiver<bool>) -> JobHandles {
        let sweep = tokio::spawn(sweep_task(
            Arc::clone(&self.ledger),
            self.config.sweep_interval,
            Arc::clone(&self.sweep_metrics),
            shutdown_rx.clone(),
        ));

        let indexer = self.config.indexer_enabled.then(|| {
            tokio::spawn(indexer_task(
                Arc::clone(&self.indexer),
                self.config.indexer_interval,
                Arc::clone(&self.indexer_metrics),
                shutdown_rx,
            ))
        });

        JobHandles { sweep, indexer }
    }
}
