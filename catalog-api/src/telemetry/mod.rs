//! Telemetry - structured logging and Prometheus metrics for the API layer.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, CatalogMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, DEFAULT_LOG_FILTER};
