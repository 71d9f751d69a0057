//! Health check endpoint for liveness probes

/// Returns `ok` whenever the server is accepting requests.
pub async fn health_handler() -> &'static str {
    "ok"
}
