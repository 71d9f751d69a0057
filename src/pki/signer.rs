//! Client certificate signing under the fixed client-auth policy.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use super::metadata::extract_ca_data;
use super::{
    CertificateArtifact, CertificateAuthority, CertificateSubject, IssuanceRequest,
    ResourceScope, SigningRequest,
};
use crate::errors::issuance::{IssuanceError, IssuanceResult};

/// Builds a signing request for one client identity and has the CA sign it.
#[derive(Clone)]
pub struct CertificateSigner {
    authority: Arc<dyn CertificateAuthority>,
}

impl CertificateSigner {
    pub fn new(authority: Arc<dyn CertificateAuthority>) -> Self {
        Self { authority }
    }

    /// Issue a certificate for `request.client_email` inside `scope`.
    ///
    /// The CA metadata is read fresh on every call. Nothing is retried: a
    /// failed signature discards the generated key with the scope.
    pub async fn issue_certificate<'s>(
        &self,
        request: &IssuanceRequest,
        scope: &'s ResourceScope,
    ) -> IssuanceResult<CertificateArtifact<'s>> {
        validate_request(request)?;

        let ca = extract_ca_data(self.authority.as_ref(), &request.ca_cert).await?;
        let now = Utc::now();
        if ca.is_expired_at(now) {
            return Err(IssuanceError::signing(format!(
                "CA certificate {} expired at {}",
                request.ca_cert.display(),
                ca.not_after
            )));
        }

        let signing = SigningRequest {
            subject: CertificateSubject::for_client(&ca, &request.client_email),
            san_dns: san_dns_name(&request.client_email),
            validity_days: request.validity_days,
            serial: random_serial(),
            ca_cert: &request.ca_cert,
            ca_key: &request.ca_key,
        };

        debug!(
            backend = self.authority.name(),
            san = %signing.san_dns,
            validity_days = signing.validity_days,
            "Signing client certificate"
        );

        let artifact = self.authority.issue(&signing, scope).await?;

        info!(
            backend = self.authority.name(),
            serial = format_args!("{:016x}", signing.serial),
            validity_days = signing.validity_days,
            "Issued client certificate"
        );
        Ok(artifact)
    }
}

impl std::fmt::Debug for CertificateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSigner").field("authority", &self.authority.name()).finish()
    }
}

/// DNS form of an email address: the first `@` becomes `.`.
///
/// `a.b@c.d` and `a@b.c.d` map to the same name; that collision is accepted.
pub fn san_dns_name(email: &str) -> String {
    email.replacen('@', ".", 1)
}

fn random_serial() -> u64 {
    // Positive, non-zero and at most 63 bits so it encodes the same everywhere.
    rand::thread_rng().gen_range(1..=i64::MAX as u64)
}

fn validate_request(request: &IssuanceRequest) -> IssuanceResult<()> {
    if request.validity_days == 0 {
        return Err(IssuanceError::InvalidRequest("validity must be at least one day".into()));
    }

    let email = request.client_email.as_str();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(IssuanceError::InvalidRequest(format!("'{email}' is not an email address")));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(IssuanceError::InvalidRequest(format!("'{email}' is not an email address")));
    }
    // Values end up inside a generated config file and a DN.
    if email.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return Err(IssuanceError::InvalidRequest(
            "email contains characters that cannot appear in a certificate subject".into(),
        ));
    }
    Ok(())
}
