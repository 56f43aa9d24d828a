//! OpenAPI document for the admin surface.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{cache, health, index};
use crate::telemetry::metrics;
use crate::types::*;

/// Every success body listed here is delivered inside the
/// `{success, response, error}` envelope.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Catalog Coherence Admin API",
        description = "Cache coherence and search index administration",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Cache", description = "Emergency override, sweep, status and repair"),
        (name = "Index", description = "On-demand search index synchronization"),
        (name = "Health", description = "Liveness and readiness"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        cache::emergency_evict,
        cache::cache_status,
        cache::batch_process,
        cache::validate_entity,
        index::sync_index,
        health::ping,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        SweepSummary,
        EmergencyEvictResponse,
        ValidationStatus,
        ValidateResponse,
        IndexTrigger,
        IndexerPhase,
        IndexRunSummary,
        DirtyRegionEntry,
        BatchTypeSummary,
        BatchStatsSummary,
        CacheStatusResponse,
        health::HealthResponse,
        health::HealthStatus,
        health::HealthDetails,
        health::ComponentHealth,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_paths_are_documented() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/admin/cache/emergency/{id}",
            "/admin/cache/debug/status",
            "/admin/cache/batch/process",
            "/admin/cache/validate/{id}",
            "/admin/index/sync",
            "/metrics",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
    }
}
