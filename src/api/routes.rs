use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::get,
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::observability::trace_http_requests;
use crate::services::IssuanceOrchestrator;

use super::handlers::{health_handler, index_handler, issue_bundle_handler};

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<IssuanceOrchestrator>,
}

impl ApiState {
    pub fn new(orchestrator: IssuanceOrchestrator) -> Self {
        Self { orchestrator: Arc::new(orchestrator) }
    }
}

/// Router for the issuance form, bundle download and health probe.
///
/// A request that exceeds the configured timeout is dropped, which cancels
/// any running issuance and removes its scratch directory.
pub fn build_router(state: ApiState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(index_handler).post(issue_bundle_handler))
        .route("/healthz", get(health_handler))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(request_timeout(config))
        .layer(middleware::from_fn(trace_http_requests))
        .with_state(state)
}

fn request_timeout(config: &ServerConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout())
}
