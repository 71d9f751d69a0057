use std::path::Path;
use std::sync::Arc;

use mtlsgate::errors::IssuanceError;
use mtlsgate::pki::{extract_ca_data, CertificateAuthority, NativeAuthority};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use tempfile::TempDir;
use x509_parser::prelude::*;

use super::support::{
    assert_client_policy, issue_and_package, request, subject_attributes, OID_LOCALITY,
    OID_ORGANIZATION,
};
use crate::common::{is_empty_dir, KeyEncoding, TestCa, CA_EMAIL, CA_ORGANIZATION, TEST_KEY_BITS};

fn authority() -> Arc<dyn CertificateAuthority> {
    Arc::new(NativeAuthority::with_key_bits(TEST_KEY_BITS))
}

#[tokio::test]
async fn test_extracts_ca_metadata_from_pem() {
    let ca = TestCa::new().unwrap();

    let info = extract_ca_data(authority().as_ref(), &ca.cert_path).await.unwrap();

    assert_eq!(info.country.as_deref(), Some("NZ"));
    assert_eq!(info.state.as_deref(), Some("Wellington"));
    assert_eq!(info.locality.as_deref(), Some("Te Aro"));
    assert_eq!(info.organization.as_deref(), Some(CA_ORGANIZATION));
    assert_eq!(info.email_address.as_deref(), Some(CA_EMAIL));
    assert!(info.not_after > chrono::Utc::now() + chrono::Duration::days(360));
}

#[tokio::test]
async fn test_issued_certificate_follows_policy() {
    let ca = TestCa::new().unwrap();
    let work = TempDir::new().unwrap();

    let issued = issue_and_package(
        authority(),
        request(&ca, "alice@example.com", 30),
        "alice laptop",
        work.path(),
    )
    .await
    .unwrap();

    assert_client_policy(&issued.cert_der, &ca, "alice@example.com", 30);

    let (_, cert) = X509Certificate::from_der(&issued.cert_der).unwrap();
    match cert.public_key().parsed().unwrap() {
        x509_parser::public_key::PublicKey::RSA(rsa) => assert_eq!(rsa.key_size(), TEST_KEY_BITS),
        other => panic!("expected an RSA key, got {other:?}"),
    }
    assert!(is_empty_dir(work.path()));
}

#[tokio::test]
async fn test_bundle_contains_key_leaf_and_ca() {
    let ca = TestCa::new().unwrap();
    let work = TempDir::new().unwrap();

    let issued = issue_and_package(
        authority(),
        request(&ca, "bob@example.org", 7),
        "bob phone",
        work.path(),
    )
    .await
    .unwrap();

    let pfx = p12::PFX::parse(&issued.bundle).expect("PKCS#12 structure");
    assert!(pfx.verify_mac(""));

    let certs = pfx.cert_x509_bags("").unwrap();
    assert_eq!(certs.len(), 2);
    assert!(certs.contains(&issued.cert_der));
    assert!(certs.contains(&ca.cert_der()));

    let keys = pfx.key_bags("").unwrap();
    assert_eq!(keys.len(), 1);
    let key = RsaPrivateKey::from_pkcs8_der(&keys[0]).unwrap();
    let spki = key.to_public_key().to_public_key_der().unwrap();
    let (_, cert) = X509Certificate::from_der(&issued.cert_der).unwrap();
    assert_eq!(spki.as_bytes(), cert.public_key().raw);

    let bags = pfx.bags("").unwrap();
    assert!(bags.iter().any(|bag| bag
        .attributes
        .iter()
        .any(|attr| matches!(attr, p12::PKCS12Attribute::FriendlyName(name) if name == "bob phone"))));
}

#[tokio::test]
async fn test_pkcs1_ca_key_is_accepted() {
    let ca = TestCa::with_key_encoding(KeyEncoding::Pkcs1).unwrap();
    let work = TempDir::new().unwrap();

    let issued = issue_and_package(
        authority(),
        request(&ca, "carol@example.com", 1),
        "carol",
        work.path(),
    )
    .await
    .unwrap();

    assert_client_policy(&issued.cert_der, &ca, "carol@example.com", 1);
}

#[tokio::test]
async fn test_expired_ca_is_refused_before_signing() {
    let ca = TestCa::expired().unwrap();
    let work = TempDir::new().unwrap();

    let err = issue_and_package(
        authority(),
        request(&ca, "dave@example.com", 30),
        "dave",
        work.path(),
    )
    .await
    .err()
    .expect("expired CA must fail");

    assert!(matches!(err, IssuanceError::SigningTool { .. }));
    assert!(err.to_string().contains("expired"));
    assert!(is_empty_dir(work.path()));
}

#[tokio::test]
async fn test_mismatched_ca_key_is_a_signing_error() {
    let ca = TestCa::new().unwrap();
    let other = TestCa::new().unwrap();
    let work = TempDir::new().unwrap();

    let mut mismatched = request(&ca, "erin@example.com", 30);
    mismatched.ca_key = other.key_path.clone();

    let err = issue_and_package(authority(), mismatched, "erin", work.path())
        .await
        .err()
        .expect("mismatched key must fail");

    assert!(matches!(err, IssuanceError::SigningTool { .. }));
    assert!(is_empty_dir(work.path()));
}

#[tokio::test]
async fn test_invalid_requests_never_reach_the_backend() {
    let ca = TestCa::new().unwrap();
    let work = TempDir::new().unwrap();

    for (email, days) in [("alice@example.com", 0), ("no-at-sign", 30), ("a@b\nc", 30)] {
        let err = issue_and_package(authority(), request(&ca, email, days), "x", work.path())
            .await
            .err()
            .expect("invalid request must fail");
        assert!(matches!(err, IssuanceError::InvalidRequest(_)), "{email:?}/{days}: {err}");
    }
    assert!(is_empty_dir(work.path()));
}

#[tokio::test]
async fn test_missing_ca_certificate_is_a_metadata_error() {
    let work = TempDir::new().unwrap();
    let mut req = request(&TestCa::new().unwrap(), "frank@example.com", 30);
    req.ca_cert = Path::new("/nonexistent/ca.crt").to_path_buf();

    let err = issue_and_package(authority(), req, "frank", work.path())
        .await
        .err()
        .expect("missing CA must fail");

    assert!(matches!(err, IssuanceError::MetadataParse { .. }));
}

#[tokio::test]
async fn test_non_ascii_ca_names_are_copied_verbatim() {
    let ca = TestCa::with_names("München", "Müller GmbH").unwrap();
    let work = TempDir::new().unwrap();

    let issued = issue_and_package(
        authority(),
        request(&ca, "bob@example.com", 30),
        "bob",
        work.path(),
    )
    .await
    .unwrap();

    let (_, cert) = X509Certificate::from_der(&issued.cert_der).unwrap();
    let subject = subject_attributes(&cert);
    let value = |oid: &str| {
        subject.iter().find(|(key, _)| key == oid).map(|(_, value)| value.as_str())
    };
    assert_eq!(value(OID_LOCALITY), Some("München"));
    assert_eq!(value(OID_ORGANIZATION), Some("Müller GmbH"));
}
