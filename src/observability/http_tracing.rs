//! # HTTP Request Tracing Middleware
//!
//! Axum middleware that wraps each request in a span and records latency.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;

use super::MetricsRecorder;

/// Run the request inside a `http_request` span and record status and latency.
pub async fn trace_http_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let span = crate::request_span!(method, path, status = tracing::field::Empty);
    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    span.record("status", status);

    span.in_scope(|| {
        if status >= 500 {
            tracing::warn!(status, elapsed_ms = elapsed.as_millis() as u64, "Request failed");
        } else {
            tracing::debug!(status, elapsed_ms = elapsed.as_millis() as u64, "Request completed");
        }
    });

    MetricsRecorder::new().record_http_request(
        &method,
        normalize_path_for_metrics(&path),
        status,
        elapsed.as_secs_f64(),
    );

    response
}

/// Collapse unknown paths so scanners cannot blow up label cardinality.
fn normalize_path_for_metrics(path: &str) -> &str {
    match path {
        "/" | "/healthz" => path,
        _ => "other",
    }
}
