//! Admin endpoints driven through the router over in-memory stores.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use catalog_api::{create_api_router, AppState};
use catalog_core::{Clock, CoherenceConfig, DomainEvent, EntityDetail, EntityId, Region};
use catalog_events::EventDispatcher;
use catalog_storage::ALL_OPERATIONS;
use catalog_sync::{CoherenceServices, StoreSet};
use catalog_test_utils::{changed_row, MemoryStores};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    stores: MemoryStores,
    services: CoherenceServices,
    dispatcher: EventDispatcher,
    _shutdown: watch::Sender<bool>,
}

impl TestApp {
    fn new() -> Self {
        let stores = MemoryStores::new();
        let store_set = StoreSet {
            cache: stores.cache.clone(),
            kv: stores.kv.clone(),
            search: stores.search.clone(),
            primary: stores.primary.clone(),
            details: stores.details.clone(),
            views: stores.views.clone(),
        };
        let services =
            CoherenceServices::new(store_set, CoherenceConfig::default(), stores.clock.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, _worker) = services.dispatcher_builder().start(shutdown_rx);
        let router = create_api_router(AppState::new(services.clone(), dispatcher.clone()));

        Self {
            router,
            stores,
            services,
            dispatcher,
            _shutdown: shutdown_tx,
        }
    }

    async fn send(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri).await;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn send_raw(&self, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        (status, bytes.to_vec())
    }

    async fn publish_and_settle(&self, event: DomainEvent) {
        self.dispatcher.publish(event);
        self.dispatcher.wait_idle().await;
    }
}

// ============================================================================
// EMERGENCY OVERRIDE
// ============================================================================

#[tokio::test]
async fn test_emergency_evict_clears_regions_and_drains_ledger() {
    let app = TestApp::new();
    app.publish_and_settle(DomainEvent::price_changed(EntityId::new(5), 100, 150))
        .await;
    assert_eq!(
        app.services.ledger.dirty_regions().await.expect("scan").len(),
        2
    );

    let (status, body) = app
        .send(Method::DELETE, "/admin/cache/emergency/99?reason=bad-data")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["error"].is_null());
    assert_eq!(body["response"]["entity_id"], 99);
    assert_eq!(body["response"]["reason"], "bad-data");
    assert_eq!(
        body["response"]["affected_regions"],
        json!(["entity-detail", "search-results", "admin-listing"])
    );

    assert_eq!(app.stores.cache.eviction_count(&Region::ENTITY_DETAIL, "99"), 1);
    assert!(app.services.ledger.dirty_regions().await.expect("scan").is_empty());
    assert_eq!(app.services.emergency.invocations(), 1);
}

#[tokio::test]
async fn test_emergency_evict_requires_reason() {
    let app = TestApp::new();

    for uri in [
        "/admin/cache/emergency/99",
        "/admin/cache/emergency/99?reason=",
        "/admin/cache/emergency/99?reason=%20%20",
    ] {
        let (status, body) = app.send(Method::DELETE, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["success"], false);
        assert!(body["response"].is_null());
        assert_eq!(body["error"]["code"], "MISSING_FIELD");
    }

    assert_eq!(app.stores.cache.eviction_count(&Region::ENTITY_DETAIL, "99"), 0);
    assert_eq!(app.services.emergency.invocations(), 0);
}

#[tokio::test]
async fn test_emergency_evict_rejects_malformed_id() {
    let app = TestApp::new();

    let (status, body) = app
        .send(Method::DELETE, "/admin/cache/emergency/abc?reason=bad-data")
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_emergency_store_failure_is_reported() {
    let app = TestApp::new();
    app.publish_and_settle(DomainEvent::price_changed(EntityId::new(5), 100, 150))
        .await;
    app.stores.cache.faults().fail("clear_region:search-results");

    let (status, body) = app
        .send(Method::DELETE, "/admin/cache/emergency/99?reason=bad-data")
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    // The sweep never ran, so the marks are still there for the next cycle.
    assert_eq!(
        app.services.ledger.dirty_regions().await.expect("scan").len(),
        2
    );
}

// ============================================================================
// STATUS / BATCH
// ============================================================================

#[tokio::test]
async fn test_status_reports_dirty_regions_sorted() {
    let app = TestApp::new();
    app.publish_and_settle(DomainEvent::price_changed(EntityId::new(42), 1000, 1200))
        .await;

    let (status, body) = app.send(Method::GET, "/admin/cache/debug/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let response = &body["response"];
    assert_eq!(response["dirty_count"], 2);
    assert_eq!(response["dirty_regions"][0]["region"], "admin-listing");
    assert_eq!(response["dirty_regions"][1]["region"], "search-results");
    assert_eq!(response["cache_backend"], "memory");
    assert_eq!(response["indexer_state"], "idle");
    assert!(response["last_index_run"].is_null());
    assert_eq!(response["batch_stats"]["date"], "2026-01-15");
}

#[tokio::test]
async fn test_batch_process_sweeps_and_records_statistics() {
    let app = TestApp::new();
    app.publish_and_settle(DomainEvent::price_changed(EntityId::new(42), 1000, 1200))
        .await;

    let (status, body) = app.send(Method::POST, "/admin/cache/batch/process").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["processed"], 2);
    assert_eq!(body["response"]["failed"], 0);

    let (_, body) = app.send(Method::GET, "/admin/cache/debug/status").await;
    let response = &body["response"];
    assert_eq!(response["dirty_count"], 0);
    assert_eq!(response["batch_stats"]["batches"]["search_cache"]["count"], 2);
}

#[tokio::test]
async fn test_status_surfaces_ledger_outage() {
    let app = TestApp::new();
    app.stores.kv.faults().fail(ALL_OPERATIONS);

    let (status, body) = app.send(Method::GET, "/admin/cache/debug/status").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

// ============================================================================
// VALIDATE
// ============================================================================

#[tokio::test]
async fn test_validate_repairs_stale_detail() {
    let app = TestApp::new();
    let id = EntityId::new(3);
    let detail = |title: &str| EntityDetail {
        entity_id: id,
        updated_at: app.stores.clock.now(),
        payload: json!({ "title": title }),
    };

    let (_, body) = app.send(Method::POST, "/admin/cache/validate/3").await;
    assert_eq!(body["response"]["outcome"], "not_cached");

    app.stores.details.put(detail("Chair"));
    app.services
        .details
        .cached_detail(id)
        .await
        .expect("read should succeed");

    app.stores.clock.advance(Duration::from_secs(60));
    app.stores.details.put(detail("Armchair"));

    let (status, body) = app.send(Method::POST, "/admin/cache/validate/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["entity_id"], 3);
    assert_eq!(body["response"]["outcome"], "repaired");

    let (_, body) = app.send(Method::POST, "/admin/cache/validate/3").await;
    assert_eq!(body["response"]["outcome"], "consistent");
}

// ============================================================================
// INDEX SYNC
// ============================================================================

#[tokio::test]
async fn test_index_sync_on_demand_and_full() {
    let app = TestApp::new();
    let now = app.stores.clock.now();
    app.stores.primary.upsert_row(changed_row(1, now));
    app.stores.primary.upsert_row(changed_row(2, now));

    let (status, body) = app.send(Method::POST, "/admin/index/sync").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["trigger"], "on_demand");
    assert_eq!(body["response"]["documents_written"], 2);
    assert_eq!(app.stores.search.document_count(), 2);

    let (_, body) = app.send(Method::POST, "/admin/index/sync?full=true").await;
    assert_eq!(body["response"]["trigger"], "full_resync");
    assert_eq!(body["response"]["lower_bound"], "1970-01-01T00:00:00Z");

    let (_, body) = app.send(Method::GET, "/admin/cache/debug/status").await;
    assert_eq!(body["response"]["last_index_run"]["trigger"], "full_resync");
}

// ============================================================================
// HEALTH / METRICS
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let (status, bytes) = app.send_raw(Method::GET, "/health/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"pong");

    let (status, body) = app.send(Method::GET, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    app.stores.kv.faults().fail(ALL_OPERATIONS);
    let (status, body) = app.send(Method::GET, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["details"]["ledger"]["status"], "unhealthy");
    assert_eq!(body["details"]["cache"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_exposes_coherence_counters() {
    let app = TestApp::new();
    app.publish_and_settle(DomainEvent::price_changed(EntityId::new(42), 1000, 1200))
        .await;

    let (status, bytes) = app.send_raw(Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(bytes).expect("metrics are utf-8");
    assert!(text.contains("catalog_coherence_counter"));
    assert!(text.contains("catalog_dirty_regions"));
}
