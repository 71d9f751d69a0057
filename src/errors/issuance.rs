use std::path::PathBuf;

use thiserror::Error;

/// Result type for the issuance pipeline.
pub type IssuanceResult<T> = std::result::Result<T, IssuanceError>;

/// Failures raised while authenticating a client and issuing its bundle.
///
/// Only [`IssuanceError::LookupMiss`] is user-correctable. Every other variant
/// is fatal for the request; its text is logged but never shown to the
/// requester because signer diagnostics can reveal CA paths and settings.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// No enabled client record matches the presented shared secret.
    #[error("No client matches the presented preshared key")]
    LookupMiss,

    /// The client directory could not be read.
    #[error("Client directory lookup failed: {message}")]
    Directory {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The CA certificate could not be decoded into subject fields and expiry.
    #[error("Failed to extract CA metadata from {path}: {reason}")]
    MetadataParse { path: PathBuf, reason: String },

    /// The request cannot be turned into a certificate (bad email, zero validity).
    #[error("Invalid issuance request: {0}")]
    InvalidRequest(String),

    /// Key generation, CSR creation or CA signing failed.
    #[error("Signing failed: {message}")]
    SigningTool { message: String },

    /// Building the PKCS#12 bundle failed.
    #[error("Bundle packaging failed: {message}")]
    Packaging { message: String },

    /// The ephemeral working directory could not be created, written or removed.
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IssuanceError {
    pub fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MetadataParse { path: path.into(), reason: reason.into() }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::SigningTool { message: message.into() }
    }

    pub fn packaging(message: impl Into<String>) -> Self {
        Self::Packaging { message: message.into() }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem { path: path.into(), source }
    }

    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory { message: message.into(), source: None }
    }

    pub fn directory_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Directory { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Whether the requester can fix this by presenting different input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::LookupMiss)
    }

    /// Short stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LookupMiss => "lookup_miss",
            Self::Directory { .. } => "directory",
            Self::MetadataParse { .. } => "metadata_parse",
            Self::InvalidRequest(_) => "invalid_request",
            Self::SigningTool { .. } => "signing_tool",
            Self::Packaging { .. } => "packaging",
            Self::Filesystem { .. } => "filesystem",
        }
    }
}
