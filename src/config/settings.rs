//! # Configuration Settings
//!
//! Defines the configuration structure for mtlsgate.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Certificate authority material and backend
    #[validate(nested)]
    pub ca: CaConfig,

    /// Client directory location
    #[validate(nested)]
    pub directory: DirectoryConfig,

    /// Issuance policy and limits
    #[validate(nested)]
    pub issuance: IssuanceConfig,

    /// Logging and metrics
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        if self.ca.cert_path.as_os_str().is_empty() {
            return Err(Error::validation("CA certificate path cannot be empty"));
        }
        if self.ca.key_path.as_os_str().is_empty() {
            return Err(Error::validation("CA private key path cannot be empty"));
        }
        if self.directory.clients_dir.as_os_str().is_empty() {
            return Err(Error::validation("Client directory path cannot be empty"));
        }
        if self.ca.backend == CaBackend::Openssl && self.ca.openssl_binary.as_os_str().is_empty() {
            return Err(Error::validation("openssl binary cannot be empty"));
        }
        if self.observability.metrics_port == Some(self.server.port) {
            return Err(Error::validation("Server and metrics ports cannot be the same"));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Upper bound for one request, issuance included
    #[validate(range(min = 1, max = 600, message = "Timeout must be between 1 and 600 seconds"))]
    pub request_timeout_seconds: u64,

    /// Maximum form body size in bytes
    #[validate(range(min = 1024, message = "Max body size must be at least 1KB"))]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 120,
            max_body_size: 16 * 1024,
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Which implementation performs key generation, signing and packaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaBackend {
    /// Shell out to the `openssl` command line tool
    Openssl,
    /// In-process rcgen/rsa/p12
    Native,
}

impl std::fmt::Display for CaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Openssl => f.write_str("openssl"),
            Self::Native => f.write_str("native"),
        }
    }
}

/// Certificate authority configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CaConfig {
    pub backend: CaBackend,

    /// PEM CA certificate
    pub cert_path: PathBuf,

    /// PEM CA private key (PKCS#8 or PKCS#1 RSA)
    pub key_path: PathBuf,

    /// Binary used by the openssl backend
    pub openssl_binary: PathBuf,

    /// Export bundles with `-legacy` (OpenSSL 3 only)
    pub legacy_pkcs12: bool,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            backend: CaBackend::Openssl,
            cert_path: PathBuf::from("ca/ca.crt"),
            key_path: PathBuf::from("ca/ca.key"),
            openssl_binary: PathBuf::from("openssl"),
            legacy_pkcs12: true,
        }
    }
}

/// Client directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Directory holding one `*.json` record per client
    pub clients_dir: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { clients_dir: PathBuf::from("db/clients") }
    }
}

/// Issuance policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IssuanceConfig {
    /// Lifetime of issued client certificates
    #[validate(range(min = 1, max = 3650, message = "Validity must be between 1 and 3650 days"))]
    pub validity_days: u32,

    /// Parent of the per-request scratch directories (system temp dir if unset)
    pub work_dir: Option<PathBuf>,

    /// Issuances allowed to run at once; further requests wait
    #[validate(range(min = 1, max = 256, message = "Concurrency must be between 1 and 256"))]
    pub max_concurrent_issuances: usize,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self { validity_days: 30, work_dir: None, max_concurrent_issuances: 4 }
    }
}

impl IssuanceConfig {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Prometheus exporter port (disabled if unset)
    #[validate(range(min = 1, message = "Metrics port must be between 1 and 65535"))]
    pub metrics_port: Option<u16>,

    /// Global `service` label on exported metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            metrics_port: None,
            service_name: crate::APP_NAME.to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        self.metrics_port.map(|port| format!("0.0.0.0:{}", port))
    }
}
