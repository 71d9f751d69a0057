//! # Structured Logging
//!
//! Subscriber setup and span macros. Preshared keys and key material are
//! never recorded as span or event fields.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Create a tracing span for HTTP request tracking.
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one issuance attempt.
///
/// `client` and `outcome` start empty and are recorded once known.
#[macro_export]
macro_rules! issuance_span {
    ($backend:expr) => {
        tracing::info_span!(
            "issuance",
            backend = %$backend,
            issuance_id = %uuid::Uuid::new_v4(),
            client = tracing::field::Empty,
            outcome = tracing::field::Empty
        )
    };
    ($backend:expr, $($field:tt)*) => {
        tracing::info_span!(
            "issuance",
            backend = %$backend,
            issuance_id = %uuid::Uuid::new_v4(),
            client = tracing::field::Empty,
            outcome = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Fails if a subscriber is
/// already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        ca_backend = %config.ca.backend,
        ca_cert = %config.ca.cert_path.display(),
        clients_dir = %config.directory.clients_dir.display(),
        validity_days = config.issuance.validity_days,
        max_concurrent_issuances = config.issuance.max_concurrent_issuances,
        metrics_port = ?config.observability.metrics_port,
        "mtlsgate configuration"
    );
}
