//! PKCS#12 packaging of an issued certificate.
//!
//! The archive holds the client key, its certificate and the CA certificate,
//! with an empty password. Download filenames are derived from the client name.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{CertificateArtifact, CertificateAuthority};
use crate::errors::issuance::{IssuanceError, IssuanceResult};

/// File extension of exported bundles.
pub const BUNDLE_EXTENSION: &str = "pfx";

/// Packs a signed artifact and the CA certificate into one PKCS#12 archive.
#[derive(Clone)]
pub struct BundlePackager {
    authority: Arc<dyn CertificateAuthority>,
}

impl BundlePackager {
    pub fn new(authority: Arc<dyn CertificateAuthority>) -> Self {
        Self { authority }
    }

    /// Export key, leaf and CA certificate, password-less, labelled `friendly_name`.
    pub async fn package_bundle(
        &self,
        artifact: &CertificateArtifact<'_>,
        ca_cert: &Path,
        friendly_name: &str,
    ) -> IssuanceResult<Vec<u8>> {
        let bundle = self.authority.package(artifact, ca_cert, friendly_name).await?;
        if bundle.is_empty() {
            return Err(IssuanceError::packaging(format!(
                "{} backend produced an empty bundle",
                self.authority.name()
            )));
        }

        debug!(backend = self.authority.name(), bytes = bundle.len(), "Packaged PKCS#12 bundle");
        Ok(bundle)
    }
}

impl std::fmt::Debug for BundlePackager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundlePackager").field("authority", &self.authority.name()).finish()
    }
}

/// Download name for a client's bundle.
///
/// The display name goes into a `Content-Disposition` header, so anything
/// outside a conservative character set is replaced with `_`.
pub fn bundle_filename(display_name: &str) -> String {
    let stem: String = display_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('.');
    let stem = if stem.is_empty() { "client" } else { stem };
    format!("{stem}.{BUNDLE_EXTENSION}")
}
