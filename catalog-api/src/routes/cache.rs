//! Cache administration endpoints
//!
//! - `DELETE /admin/cache/emergency/{id}?reason=` - emergency override
//! - `GET /admin/cache/debug/status` - dirty ledger and cache snapshot
//! - `POST /admin/cache/batch/process` - immediate sweep
//! - `POST /admin/cache/validate/{id}` - single-entity check and repair

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use catalog_core::EntityId;
use catalog_sync::CoherenceServices;

use crate::error::{ApiEnvelope, ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::METRICS;
use crate::types::{
    CacheStatusResponse, EmergencyEvictQuery, EmergencyEvictResponse, SweepSummary,
    ValidateResponse,
};

pub(crate) fn parse_entity_id(raw: &str) -> ApiResult<EntityId> {
    raw.parse::<EntityId>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid entity id: {}", raw)))
}

pub(crate) fn record_operation(operation: &str, success: bool) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_admin_operation(operation, success);
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Evict one entity's detail entry, clear every search and listing region
/// and drain the dirty ledger. Any store failure fails the request.
#[utoipa::path(
    delete,
    path = "/admin/cache/emergency/{id}",
    tag = "Cache",
    params(
        ("id" = i64, Path, description = "Entity id"),
        EmergencyEvictQuery,
    ),
    responses(
        (status = 200, description = "Override completed", body = EmergencyEvictResponse),
        (status = 400, description = "Missing reason or malformed id", body = ApiError),
        (status = 500, description = "A store operation failed", body = ApiError),
        (status = 503, description = "A store is unavailable", body = ApiError),
        (status = 504, description = "A store operation timed out", body = ApiError),
    ),
)]
pub async fn emergency_evict(
    State(services): State<CoherenceServices>,
    Path(id): Path<String>,
    Query(query): Query<EmergencyEvictQuery>,
) -> ApiResult<Json<ApiEnvelope<EmergencyEvictResponse>>> {
    let entity_id = parse_entity_id(&id)?;
    let reason = query
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::missing_field("reason"))?;

    let result = services.emergency.emergency_evict(entity_id, &reason).await;
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_emergency_override(result.is_ok());
    }

    let report = result.map_err(|e| {
        tracing::error!(entity_id = %entity_id, error = %e, "Emergency override failed");
        ApiError::from(e)
    })?;
    Ok(Json(ApiEnvelope::ok(report.into())))
}

#[utoipa::path(
    get,
    path = "/admin/cache/debug/status",
    tag = "Cache",
    responses(
        (status = 200, description = "Current coherence status", body = CacheStatusResponse),
        (status = 503, description = "Ledger store unavailable", body = ApiError),
        (status = 504, description = "Ledger store timed out", body = ApiError),
    ),
)]
pub async fn cache_status(
    State(services): State<CoherenceServices>,
) -> ApiResult<Json<ApiEnvelope<CacheStatusResponse>>> {
    let ledger = services.ledger.status().await?;
    let response = CacheStatusResponse::new(
        ledger,
        services.regions.backend_name(),
        services.indexer.state(),
        services.indexer.last_report(),
    );
    Ok(Json(ApiEnvelope::ok(response)))
}

#[utoipa::path(
    post,
    path = "/admin/cache/batch/process",
    tag = "Cache",
    responses(
        (status = 200, description = "Sweep completed", body = SweepSummary),
        (status = 500, description = "A region could not be cleared", body = ApiError),
        (status = 504, description = "A store operation timed out", body = ApiError),
    ),
)]
pub async fn batch_process(
    State(services): State<CoherenceServices>,
) -> ApiResult<Json<ApiEnvelope<SweepSummary>>> {
    let result = services.ledger.sweep_now().await;
    record_operation("batch_process", result.is_ok());

    let report = result?;
    tracing::info!(
        processed = report.processed,
        skipped = report.skipped,
        "Manual sweep completed"
    );
    Ok(Json(ApiEnvelope::ok(report.into())))
}

#[utoipa::path(
    post,
    path = "/admin/cache/validate/{id}",
    tag = "Cache",
    params(("id" = i64, Path, description = "Entity id")),
    responses(
        (status = 200, description = "Entry checked", body = ValidateResponse),
        (status = 400, description = "Malformed id", body = ApiError),
        (status = 504, description = "A store operation timed out", body = ApiError),
    ),
)]
pub async fn validate_entity(
    State(services): State<CoherenceServices>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiEnvelope<ValidateResponse>>> {
    let entity_id = parse_entity_id(&id)?;
    let result = services.details.validate_and_repair(entity_id).await;
    record_operation("validate", result.is_ok());

    let outcome = result?;
    Ok(Json(ApiEnvelope::ok(ValidateResponse {
        entity_id,
        outcome: outcome.into(),
    })))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/emergency/:id", delete(emergency_evict))
        .route("/debug/status", get(cache_status))
        .route("/batch/process", post(batch_process))
        .route("/validate/:id", post(validate_entity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_parse_entity_id() {
        assert_eq!(parse_entity_id("42").ok(), Some(EntityId::new(42)));
        assert_eq!(parse_entity_id(" 7 ").ok(), Some(EntityId::new(7)));

        let err = parse_entity_id("abc").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
