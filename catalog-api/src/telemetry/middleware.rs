//! Request instrumentation middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::METRICS;

/// Replace numeric path segments with `{id}` to keep label cardinality flat.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let digits = segment.strip_prefix('-').unwrap_or(segment);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Wrap every request in a span and record its latency and status.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = normalize_path(&path);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %route,
    );
    let response = next.run(request).instrument(span).await;

    let status = response.status();
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(
            method.as_str(),
            &route,
            status.as_u16(),
            start.elapsed().as_secs_f64(),
        );
    }
    if status.is_server_error() {
        tracing::warn!(http.method = %method, http.route = %route, status = status.as_u16(), "Request failed");
    }

    response
}
