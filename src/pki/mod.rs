//! # Certificate Issuance Pipeline
//!
//! Everything between "this client is authorised" and "here are the bundle
//! bytes": reading the CA's own metadata, signing a client certificate under
//! a fixed policy, packaging it as PKCS#12, and the ephemeral directory that
//! holds unencrypted key material while that happens.
//!
//! Cryptographic work sits behind [`CertificateAuthority`]. Two backends ship
//! with the crate:
//!
//! - [`OpensslAuthority`] drives the `openssl` command line tool.
//! - [`NativeAuthority`] uses `rcgen`, `rsa` and `p12` in process.
//!
//! The signer and packager never assume which one they are talking to.

pub mod bundle;
pub mod metadata;
pub mod native;
pub mod openssl;
pub mod scope;
pub mod signer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{CaBackend, CaConfig};
use crate::errors::issuance::IssuanceResult;

pub use bundle::{bundle_filename, BundlePackager};
pub use metadata::extract_ca_data;
pub use native::NativeAuthority;
pub use openssl::OpensslAuthority;
pub use scope::{with_scope, CertificateArtifact, ResourceScope};
pub use signer::CertificateSigner;

/// Modulus size for every client key.
pub const RSA_KEY_BITS: usize = 4096;

/// MIME type of the bundle handed back to clients.
pub const PKCS12_CONTENT_TYPE: &str = "application/x-pkcs12";

/// Bundles are exported without a password.
pub const BUNDLE_PASSWORD: &str = "";

/// File names used inside a resource scope.
pub const KEY_FILE: &str = "key.pem";
pub const CSR_CONFIG_FILE: &str = "csr.conf";
pub const CSR_FILE: &str = "req.csr";
pub const CERT_FILE: &str = "cert.crt";

/// Subject fields and expiry recovered from the CA certificate.
///
/// Recomputed for every request so a rotated CA is picked up immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaInfo {
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub email_address: Option<String>,
    pub not_after: DateTime<Utc>,
}

impl CaInfo {
    /// Build from `(key, value)` subject attributes in any order.
    ///
    /// Keys use OpenSSL's short names (`C`, `ST`, `L`, `O`, `emailAddress`).
    /// Unknown keys are ignored; a repeated key keeps its first value.
    pub fn from_attributes<I, K, V>(attributes: I, not_after: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut info = Self {
            country: None,
            state: None,
            locality: None,
            organization: None,
            email_address: None,
            not_after,
        };

        for (key, value) in attributes {
            let slot = match key.as_ref() {
                "C" => &mut info.country,
                "ST" => &mut info.state,
                "L" => &mut info.locality,
                "O" => &mut info.organization,
                "emailAddress" | "Email" | "E" => &mut info.email_address,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }

        info
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.not_after <= now
    }
}

/// One issuance call: who the certificate is for and which CA signs it.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    pub client_email: String,
    pub validity_days: u32,
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
}

/// Distinguished name of an issued client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub email_address: String,
}

impl CertificateSubject {
    /// CA's trust-domain fields plus the client's email.
    pub fn for_client(ca: &CaInfo, client_email: &str) -> Self {
        Self {
            country: ca.country.clone(),
            state: ca.state.clone(),
            locality: ca.locality.clone(),
            organization: ca.organization.clone(),
            email_address: client_email.to_string(),
        }
    }

    /// `(short name, value)` pairs in the order they are written to the certificate.
    pub fn attributes(&self) -> Vec<(&'static str, &str)> {
        let mut attributes = Vec::with_capacity(5);
        for (key, value) in [
            ("C", &self.country),
            ("ST", &self.state),
            ("L", &self.locality),
            ("O", &self.organization),
        ] {
            if let Some(value) = value {
                attributes.push((key, value.as_str()));
            }
        }
        attributes.push(("emailAddress", self.email_address.as_str()));
        attributes
    }
}

/// Everything a backend needs to mint one client certificate.
#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    pub subject: CertificateSubject,
    pub san_dns: String,
    pub validity_days: u32,
    pub serial: u64,
    pub ca_cert: &'a Path,
    pub ca_key: &'a Path,
}

/// Cryptographic capability the pipeline is written against.
///
/// Implementations must keep every file they create inside the supplied
/// [`ResourceScope`] and must not retry a failed signature with the same
/// key material.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Read subject attributes and expiry from the CA certificate.
    async fn extract_metadata(&self, ca_cert: &Path) -> IssuanceResult<CaInfo>;

    /// Generate a fresh key pair and CSR, then have the CA sign it.
    async fn issue<'s>(
        &self,
        request: &SigningRequest<'_>,
        scope: &'s ResourceScope,
    ) -> IssuanceResult<CertificateArtifact<'s>>;

    /// Export key, leaf certificate and CA certificate as a PKCS#12 archive.
    async fn package(
        &self,
        artifact: &CertificateArtifact<'_>,
        ca_cert: &Path,
        friendly_name: &str,
    ) -> IssuanceResult<Vec<u8>>;
}

/// Construct the backend selected in configuration.
pub fn build_authority(config: &CaConfig) -> Arc<dyn CertificateAuthority> {
    match config.backend {
        CaBackend::Openssl => Arc::new(OpensslAuthority::new(
            config.openssl_binary.clone(),
            config.legacy_pkcs12,
        )),
        CaBackend::Native => Arc::new(NativeAuthority::new()),
    }
}
