//! Prometheus Metrics
//!
//! HTTP and admin-operation counters are recorded as requests happen. The
//! coherence core keeps its own atomic counters; those are copied into
//! gauges at scrape time so the library crates stay free of a registry.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance, registered once.
pub static METRICS: Lazy<ApiResult<CatalogMetrics>> = Lazy::new(CatalogMetrics::new);

#[derive(Clone)]
pub struct CatalogMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: operation, outcome
    pub admin_operations_total: CounterVec,

    /// labels: outcome
    pub emergency_overrides_total: CounterVec,

    /// Mirrors of the core's counters - labels: component, counter
    pub coherence_counters: GaugeVec,

    /// Regions currently marked dirty
    pub dirty_regions: Gauge,
}

fn registration_failed(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl CatalogMetrics {
    /// Create and register all metrics with the default registry.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "catalog_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_failed("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "catalog_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_failed("http_request_duration_seconds", e))?,

            admin_operations_total: register_counter_vec!(
                "catalog_admin_operations_total",
                "Administrative cache and index operations",
                &["operation", "outcome"]
            )
            .map_err(|e| registration_failed("admin_operations_total", e))?,

            emergency_overrides_total: register_counter_vec!(
                "catalog_emergency_overrides_total",
                "Emergency cache overrides",
                &["outcome"]
            )
            .map_err(|e| registration_failed("emergency_overrides_total", e))?,

            coherence_counters: register_gauge_vec!(
                "catalog_coherence_counter",
                "Cumulative counters of the coherence core, sampled at scrape time",
                &["component", "counter"]
            )
            .map_err(|e| registration_failed("coherence_counter", e))?,

            dirty_regions: register_gauge!(
                "catalog_dirty_regions",
                "Cache regions currently marked dirty"
            )
            .map_err(|e| registration_failed("dirty_regions", e))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_admin_operation(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.admin_operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_emergency_override(&self, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.emergency_overrides_total
            .with_label_values(&[outcome])
            .inc();
    }

    fn set_counter(&self, component: &str, counter: &str, value: u64) {
        self.coherence_counters
            .with_label_values(&[component, counter])
            .set(value as f64);
    }

    /// Copy the dispatcher, region, ledger, applier, indexer and job
    /// counters into gauges.
    pub fn observe(&self, state: &AppState) {
        let dispatch = state.dispatcher.metrics();
        self.set_counter("dispatcher", "published", dispatch.published);
        self.set_counter("dispatcher", "delivered", dispatch.delivered);
        self.set_counter("dispatcher", "handler_failures", dispatch.failed);
        self.set_counter("dispatcher", "handler_panics", dispatch.panicked);
        self.set_counter("dispatcher", "dropped", dispatch.dropped);

        let services = &state.services;
        let regions = services.regions.metrics();
        self.set_counter("regions", "regions_cleared", regions.regions_cleared);
        self.set_counter("regions", "keys_evicted", regions.keys_evicted);
        self.set_counter("regions", "failures", regions.failures);

        let ledger = services.ledger.metrics();
        self.set_counter("ledger", "marks_set", ledger.marks_set);
        self.set_counter("ledger", "sweeps", ledger.sweeps);
        self.set_counter("ledger", "regions_processed", ledger.regions_processed);
        self.set_counter("ledger", "sweep_failures", ledger.sweep_failures);

        let applier = services.applier.metrics();
        self.set_counter("applier", "events_applied", applier.events_applied);
        self.set_counter("applier", "actions_applied", applier.actions_applied);
        self.set_counter("applier", "actions_failed", applier.actions_failed);

        let indexer = services.indexer.metrics();
        self.set_counter("indexer", "runs", indexer.runs);
        self.set_counter("indexer", "documents_written", indexer.documents_written);
        self.set_counter("indexer", "rows_dropped", indexer.rows_dropped);
        self.set_counter("indexer", "chunk_failures", indexer.chunk_failures);
        self.set_counter("indexer", "read_failures", indexer.read_failures);

        for (job, snapshot) in [
            ("sweep_job", services.sweep_metrics.snapshot()),
            ("indexer_job", services.indexer_metrics.snapshot()),
        ] {
            self.set_counter(job, "cycles", snapshot.cycles);
            self.set_counter(job, "processed", snapshot.processed);
            self.set_counter(job, "errors", snapshot.errors);
        }

        self.set_counter("emergency", "invocations", services.emergency.invocations());
    }
}

/// Handler for GET /metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match METRICS.as_ref() {
        Ok(metrics) => {
            metrics.observe(&state);
            match state.services.ledger.dirty_regions().await {
                Ok(marks) => metrics.dirty_regions.set(marks.len() as f64),
                Err(e) => tracing::warn!(error = %e, "Failed to sample dirty regions"),
            }
        }
        Err(e) => tracing::error!(error = %e, "Metrics registry unavailable"),
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
