//! In-memory store implementations.
//!
//! Used by tests, local development and single-process deployments. Every
//! store carries a `FaultPlan` so tests can inject failures and latency at
//! named operations.

mod cache;
mod kv;
mod primary;
mod search;

pub use cache::InMemoryCacheStore;
pub use kv::InMemoryKeyValueStore;
pub use primary::{InMemoryDetailSource, InMemoryPrimaryStore, InMemoryViewCounter};
pub use search::InMemorySearchStore;

use catalog_core::{CatalogResult, StorageError};
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Operation name that fails every operation of a store.
pub const ALL_OPERATIONS: &str = "*";

/// Injected failures and latency for an in-memory store.
#[derive(Debug, Default)]
pub struct FaultPlan {
    failing: DashSet<String>,
    latency_ms: AtomicU64,
}

impl FaultPlan {
    /// Make `operation` fail until healed. Operation names are
    /// `"<method>"` or `"<method>:<qualifier>"`, e.g. `"clear_region:search-results"`.
    pub fn fail(&self, operation: impl Into<String>) {
        self.failing.insert(operation.into());
    }

    pub fn heal(&self, operation: &str) {
        self.failing.remove(operation);
    }

    pub fn heal_all(&self) {
        self.failing.clear();
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Apply configured latency, then fail if `operation` is faulted.
    pub(crate) async fn check(&self, backend: &str, operation: &str) -> CatalogResult<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.ensure(backend, operation)
    }

    pub(crate) fn ensure(&self, backend: &str, operation: &str) -> CatalogResult<()> {
        let method = operation.split(':').next().unwrap_or(operation);
        if self.failing.contains(ALL_OPERATIONS)
            || self.failing.contains(operation)
            || self.failing.contains(method)
        {
            return Err(StorageError::Unavailable {
                backend: backend.to_string(),
                reason: format!("injected fault at {operation}"),
            }
            .into());
        }
        Ok(())
    }
}

/// Tracks in-flight calls and the highest concurrency observed.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn enter(&self) -> GaugeGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard { gauge: self }
    }
}

pub(crate) struct GaugeGuard<'a> {
    gauge: &'a ConcurrencyGauge,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
