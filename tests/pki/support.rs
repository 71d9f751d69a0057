use std::path::Path;
use std::sync::Arc;

use mtlsgate::errors::IssuanceError;
use mtlsgate::pki::{
    with_scope, BundlePackager, CertificateAuthority, CertificateSigner, IssuanceRequest,
};
use x509_parser::prelude::*;

use crate::common::TestCa;

/// What one scoped issuance left behind.
pub struct Issued {
    pub cert_der: Vec<u8>,
    pub bundle: Vec<u8>,
}

pub fn request(ca: &TestCa, email: &str, validity_days: u32) -> IssuanceRequest {
    IssuanceRequest {
        client_email: email.to_string(),
        validity_days,
        ca_cert: ca.cert_path.clone(),
        ca_key: ca.key_path.clone(),
    }
}

/// Sign and package inside one scope under `work_dir`.
pub async fn issue_and_package(
    authority: Arc<dyn CertificateAuthority>,
    request: IssuanceRequest,
    friendly_name: &str,
    work_dir: &Path,
) -> Result<Issued, IssuanceError> {
    let signer = CertificateSigner::new(authority.clone());
    let packager = BundlePackager::new(authority);
    let friendly_name = friendly_name.to_string();

    with_scope(work_dir, move |scope| {
        Box::pin(async move {
            let artifact = signer.issue_certificate(&request, scope).await?;
            let pem = tokio::fs::read(artifact.certificate_path())
                .await
                .map_err(|e| IssuanceError::filesystem(artifact.certificate_path(), e))?;
            let bundle = packager.package_bundle(&artifact, &request.ca_cert, &friendly_name).await?;
            Ok::<_, IssuanceError>(Issued { cert_der: crate::common::pem_to_der(&pem), bundle })
        })
    })
    .await
}

/// Subject attributes as `(oid, value)` in certificate order.
pub fn subject_attributes(cert: &X509Certificate<'_>) -> Vec<(String, String)> {
    cert.subject()
        .iter_attributes()
        .map(|attr| {
            (attr.attr_type().to_id_string(), attr.as_str().expect("string attribute").to_string())
        })
        .collect()
}

pub const OID_COUNTRY: &str = "2.5.4.6";
pub const OID_STATE: &str = "2.5.4.8";
pub const OID_LOCALITY: &str = "2.5.4.7";
pub const OID_ORGANIZATION: &str = "2.5.4.10";
pub const OID_COMMON_NAME: &str = "2.5.4.3";
pub const OID_EMAIL: &str = "1.2.840.113549.1.9.1";
pub const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";

/// Assert the client certificate follows the issuance policy and chains to `ca`.
pub fn assert_client_policy(cert_der: &[u8], ca: &TestCa, email: &str, validity_days: u32) {
    let (_, cert) = X509Certificate::from_der(cert_der).expect("client certificate");
    let ca_der = ca.cert_der();
    let (_, ca_cert) = X509Certificate::from_der(&ca_der).expect("CA certificate");

    let subject = subject_attributes(&cert);
    let value = |oid: &str| {
        subject.iter().find(|(key, _)| key == oid).map(|(_, value)| value.as_str())
    };
    assert_eq!(value(OID_COUNTRY), Some(crate::common::CA_COUNTRY));
    assert_eq!(value(OID_STATE), Some(crate::common::CA_STATE));
    assert_eq!(value(OID_LOCALITY), Some(crate::common::CA_LOCALITY));
    assert_eq!(value(OID_ORGANIZATION), Some(crate::common::CA_ORGANIZATION));
    assert_eq!(value(OID_EMAIL), Some(email));
    assert_eq!(value(OID_COMMON_NAME), None);

    assert_eq!(cert.issuer().to_string(), ca_cert.subject().to_string());
    assert_eq!(cert.signature_algorithm.algorithm.to_id_string(), OID_SHA512_WITH_RSA);
    cert.verify_signature(Some(ca_cert.public_key())).expect("signed by the CA");

    let validity = cert.validity();
    let seconds = validity.not_after.timestamp() - validity.not_before.timestamp();
    let expected = i64::from(validity_days) * 86_400;
    assert!((seconds - expected).abs() <= 2, "validity was {seconds}s, expected {expected}s");

    let basic = cert.basic_constraints().expect("basicConstraints").expect("present");
    assert!(basic.critical);
    assert!(!basic.value.ca);

    let key_usage = cert.key_usage().expect("keyUsage").expect("present");
    assert!(key_usage.critical);
    assert!(key_usage.value.digital_signature());
    assert!(key_usage.value.key_agreement());
    assert!(!key_usage.value.key_cert_sign());
    assert!(!key_usage.value.key_encipherment());

    let eku = cert.extended_key_usage().expect("extendedKeyUsage").expect("present");
    assert!(eku.critical);
    assert!(eku.value.client_auth);
    assert!(!eku.value.server_auth);

    let san = cert.subject_alternative_name().expect("subjectAltName").expect("present");
    assert!(!san.critical);
    let expected_dns = email.replacen('@', ".", 1);
    assert_eq!(san.value.general_names, vec![GeneralName::DNSName(expected_dns.as_str())]);
}
