//! Catalog API Server Entry Point
//!
//! Builds the stores and coherence services, starts the dispatcher and the
//! periodic jobs, and serves the admin router until Ctrl-C.

use std::sync::Arc;

use axum::Router;
use catalog_api::telemetry::init_tracing;
use catalog_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState};
use catalog_core::{Clock, SystemClock};
use catalog_sync::CoherenceServices;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = ApiConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stores = config.store_set(Arc::clone(&clock))?;
    tracing::info!(
        cache_backend = stores.cache.backend_name(),
        cache_path = ?config.cache_path,
        "Stores ready"
    );

    let services = CoherenceServices::new(stores, config.coherence.clone(), clock);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (dispatcher, dispatcher_handle) = services.dispatcher_builder().start(shutdown_rx.clone());
    let jobs = services.spawn_jobs(shutdown_rx);

    let app: Router = create_api_router(AppState::new(services, dispatcher));

    let addr = config.bind_addr;
    tracing::info!(%addr, "Starting catalog admin server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_handle.await {
        tracing::warn!(error = %e, "Dispatcher worker ended abnormally");
    }
    match jobs.sweep.await {
        Ok(metrics) => tracing::info!(cycles = metrics.snapshot().cycles, "Sweep job stopped"),
        Err(e) => tracing::warn!(error = %e, "Sweep job ended abnormally"),
    }
    if let Some(indexer) = jobs.indexer {
        match indexer.await {
            Ok(metrics) => {
                tracing::info!(cycles = metrics.snapshot().cycles, "Indexer job stopped")
            }
            Err(e) => tracing::warn!(error = %e, "Indexer job ended abnormally"),
        }
    }

    Ok(())
}
