//! # Metrics Collection
//!
//! Prometheus metrics for issuance outcomes and latency. Recording is a
//! no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Duration;

use ::tracing::info;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Metrics recorder for the issuance pipeline
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record one finished request by outcome (`packaged`, `denied`, `failed`)
    pub fn record_issuance(&self, outcome: &str, duration: Duration) {
        counter!("issuance_requests_total", "outcome" => outcome.to_string()).increment(1);
        histogram!("issuance_duration_seconds", "outcome" => outcome.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record the error kind behind a failed issuance
    pub fn record_failure(&self, kind: &'static str) {
        counter!("issuance_failures_total", "kind" => kind).increment(1);
    }

    /// Track issuances currently holding a permit
    pub fn set_in_flight(&self, count: usize) {
        gauge!("issuance_in_flight").set(count as f64);
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: f64) {
        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "method" => method.to_string())
            .record(duration);
    }

    fn register_issuance_metrics(&self) {
        describe_counter!(
            "issuance_requests_total",
            Unit::Count,
            "Bundle requests grouped by outcome"
        );
        describe_histogram!(
            "issuance_duration_seconds",
            Unit::Seconds,
            "Time from secret received to bundle returned or request rejected"
        );
        describe_counter!(
            "issuance_failures_total",
            Unit::Count,
            "Failed issuances grouped by error kind"
        );
        describe_gauge!("issuance_in_flight", Unit::Count, "Issuances currently running");
        describe_counter!("http_requests_total", Unit::Count, "HTTP requests served");
        describe_histogram!(
            "http_request_duration_seconds",
            Unit::Seconds,
            "HTTP request latency"
        );

        for outcome in ["packaged", "denied", "failed"] {
            counter!("issuance_requests_total", "outcome" => outcome).absolute(0);
        }
        gauge!("issuance_in_flight").set(0.0);
    }
}

/// Install the Prometheus exporter if a metrics port is configured.
///
/// Returns whether an exporter was installed.
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<bool> {
    let Some(metrics_addr) = config.metrics_bind_address() else {
        return Ok(false);
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_issuance_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(true)
}
