//! Route modules and router assembly.

pub mod cache;
pub mod health;
pub mod index;

use axum::{middleware::from_fn, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the complete router.
///
/// # Middleware Order (outer to inner)
/// 1. TraceLayer - request/response spans for tower_http
/// 2. Observability - route-level latency and status metrics
pub fn create_api_router(state: AppState) -> Router {
    let admin = Router::new()
        .nest("/cache", cache::create_router())
        .nest("/index", index::create_router());

    let router = Router::new()
        .nest("/admin", admin)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", get(openapi_json));

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(from_fn(observability_middleware)),
    )
}

#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}
