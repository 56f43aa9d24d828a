//! Search index administration
//!
//! `POST /admin/index/sync?full=bool` runs one indexer pass now. Runs are
//! serialized, so a request that lands during a scheduled run waits for it.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use catalog_sync::{CoherenceServices, RunTrigger};

use crate::error::{ApiEnvelope, ApiError, ApiResult};
use crate::routes::cache::record_operation;
use crate::state::AppState;
use crate::types::{IndexRunSummary, IndexSyncQuery};

#[utoipa::path(
    post,
    path = "/admin/index/sync",
    tag = "Index",
    params(IndexSyncQuery),
    responses(
        (status = 200, description = "Indexer pass finished", body = IndexRunSummary),
        (status = 400, description = "Malformed query", body = ApiError),
    ),
)]
pub async fn sync_index(
    State(services): State<CoherenceServices>,
    Query(query): Query<IndexSyncQuery>,
) -> ApiResult<Json<ApiEnvelope<IndexRunSummary>>> {
    let trigger = if query.full {
        RunTrigger::FullResync
    } else {
        RunTrigger::OnDemand
    };

    let report = services.indexer.run(trigger).await;
    record_operation(
        "index_sync",
        !report.read_aborted && report.chunks_failed == 0,
    );
    Ok(Json(ApiEnvelope::ok(report.into())))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/sync", post(sync_index))
}
