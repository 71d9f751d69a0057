//! # Error Handling
//!
//! Error types for mtlsgate. Process plumbing (configuration, transport, I/O)
//! uses [`Error`]; the issuance pipeline has its own taxonomy in
//! [`IssuanceError`] so that user-correctable failures stay distinguishable
//! from fatal ones.

pub mod issuance;

pub use issuance::IssuanceError;

/// Custom result type for mtlsgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the mtlsgate process
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network transport errors (HTTP listener, metrics exporter)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Issuance pipeline errors surfaced outside the orchestrator (CLI paths)
    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
