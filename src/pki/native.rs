//! In-process backend built on `rcgen`, `rsa` and `p12`.
//!
//! RSA key generation and signing are CPU bound and run on the blocking pool.
//! The extensions that must be critical are encoded by hand because rcgen
//! marks extended key usage as non-critical.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rcgen::{
    CertificateParams, CustomExtension, DistinguishedName, DnType, DnValue, Ia5String, IsCa,
    KeyPair, SerialNumber, PKCS_RSA_SHA512,
};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use simple_asn1::{oid, ASN1Block};
use tracing::debug;
use zeroize::Zeroizing;

use super::metadata::parse_pem_certificate;
use super::{
    CaInfo, CertificateArtifact, CertificateAuthority, CertificateSubject, ResourceScope,
    SigningRequest, BUNDLE_PASSWORD, CERT_FILE, CSR_FILE, KEY_FILE, RSA_KEY_BITS,
};
use crate::errors::issuance::{IssuanceError, IssuanceResult};

const OID_BASIC_CONSTRAINTS: &[u64] = &[2, 5, 29, 19];
const OID_KEY_USAGE: &[u64] = &[2, 5, 29, 15];
const OID_EXT_KEY_USAGE: &[u64] = &[2, 5, 29, 37];
const OID_EMAIL_ADDRESS: &[u64] = &[1, 2, 840, 113549, 1, 9, 1];

/// keyUsage bits 0 (digitalSignature) and 4 (keyAgreement).
const KEY_USAGE_BITS: u8 = 0b1000_1000;

#[derive(Debug, Clone)]
pub struct NativeAuthority {
    key_bits: usize,
}

impl NativeAuthority {
    pub fn new() -> Self {
        Self { key_bits: RSA_KEY_BITS }
    }

    /// Smaller client keys. Only for tests; issued certificates always use 4096 bits.
    #[doc(hidden)]
    pub fn with_key_bits(key_bits: usize) -> Self {
        Self { key_bits }
    }
}

impl Default for NativeAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateAuthority for NativeAuthority {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn extract_metadata(&self, ca_cert: &Path) -> IssuanceResult<CaInfo> {
        let pem = tokio::fs::read(ca_cert)
            .await
            .map_err(|e| IssuanceError::metadata(ca_cert, format!("unable to read: {e}")))?;
        parse_pem_certificate(&pem, ca_cert)
    }

    async fn issue<'s>(
        &self,
        request: &SigningRequest<'_>,
        scope: &'s ResourceScope,
    ) -> IssuanceResult<CertificateArtifact<'s>> {
        let ca_cert_pem = read_to_string(request.ca_cert).await?;
        let ca_key_pem = Zeroizing::new(read_to_string(request.ca_key).await?);

        let params = client_params(request)?;
        let key_bits = self.key_bits;

        let signed = tokio::task::spawn_blocking(move || {
            sign_client(params, key_bits, &ca_cert_pem, &ca_key_pem)
        })
        .await
        .map_err(|e| IssuanceError::signing(format!("signing task failed: {e}")))??;

        let key_path = scope.write_file(KEY_FILE, signed.key_pem.as_bytes()).await?;
        scope.write_file(CSR_FILE, signed.csr_pem.as_bytes()).await?;
        let cert_path = scope.write_file(CERT_FILE, signed.cert_pem.as_bytes()).await?;
        debug!("Wrote client key, request and certificate");

        Ok(scope.artifact(key_path, cert_path))
    }

    async fn package(
        &self,
        artifact: &CertificateArtifact<'_>,
        ca_cert: &Path,
        friendly_name: &str,
    ) -> IssuanceResult<Vec<u8>> {
        let key_pem = Zeroizing::new(read_to_string(artifact.private_key_path()).await?);
        let cert_pem = tokio::fs::read(artifact.certificate_path())
            .await
            .map_err(|e| IssuanceError::filesystem(artifact.certificate_path(), e))?;
        let ca_pem =
            tokio::fs::read(ca_cert).await.map_err(|e| IssuanceError::filesystem(ca_cert, e))?;

        let key = RsaPrivateKey::from_pkcs8_pem(&key_pem)
            .map_err(|e| IssuanceError::packaging(format!("client key: {e}")))?;
        let key_der = key
            .to_pkcs8_der()
            .map_err(|e| IssuanceError::packaging(format!("client key: {e}")))?;
        let cert_der = pem_contents(&cert_pem, artifact.certificate_path())?;
        let ca_der = pem_contents(&ca_pem, ca_cert)?;

        let pfx = p12::PFX::new(
            &cert_der,
            key_der.as_bytes(),
            Some(&ca_der),
            BUNDLE_PASSWORD,
            friendly_name,
        )
        .ok_or_else(|| IssuanceError::packaging("unable to assemble PKCS#12 structure"))?;

        Ok(pfx.to_der())
    }
}

struct SignedClient {
    key_pem: Zeroizing<String>,
    csr_pem: String,
    cert_pem: String,
}

fn client_params(request: &SigningRequest<'_>) -> IssuanceResult<CertificateParams> {
    let mut params = CertificateParams::new(vec![request.san_dns.clone()])
        .map_err(|e| IssuanceError::signing(format!("subject alternative name: {e}")))?;

    params.distinguished_name = distinguished_name(&request.subject)?;
    params.serial_number = Some(SerialNumber::from(request.serial));
    params.is_ca = IsCa::NoCa;

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(i64::from(request.validity_days));

    params.custom_extensions = policy_extensions()?;
    Ok(params)
}

fn distinguished_name(subject: &CertificateSubject) -> IssuanceResult<DistinguishedName> {
    let mut dn = DistinguishedName::new();
    for (key, value) in subject.attributes() {
        match key {
            "C" => dn.push(DnType::CountryName, value),
            "ST" => dn.push(DnType::StateOrProvinceName, value),
            "L" => dn.push(DnType::LocalityName, value),
            "O" => dn.push(DnType::OrganizationName, value),
            _ => {
                let email = Ia5String::try_from(value)
                    .map_err(|e| IssuanceError::signing(format!("email address: {e}")))?;
                dn.push(DnType::CustomDnType(OID_EMAIL_ADDRESS.to_vec()), DnValue::Ia5String(email))
            }
        }
    }
    Ok(dn)
}

/// basicConstraints, keyUsage and extendedKeyUsage, all critical.
fn policy_extensions() -> IssuanceResult<Vec<CustomExtension>> {
    let basic_constraints = encode(&ASN1Block::Sequence(0, Vec::new()))?;
    let key_usage = encode(&ASN1Block::BitString(0, 5, vec![KEY_USAGE_BITS]))?;
    let ext_key_usage = encode(&ASN1Block::Sequence(
        0,
        vec![ASN1Block::ObjectIdentifier(0, oid!(1, 3, 6, 1, 5, 5, 7, 3, 2))],
    ))?;

    Ok([
        (OID_BASIC_CONSTRAINTS, basic_constraints),
        (OID_KEY_USAGE, key_usage),
        (OID_EXT_KEY_USAGE, ext_key_usage),
    ]
    .into_iter()
    .map(|(oid, der)| {
        let mut extension = CustomExtension::from_oid_content(oid, der);
        extension.set_criticality(true);
        extension
    })
    .collect())
}

fn encode(block: &ASN1Block) -> IssuanceResult<Vec<u8>> {
    simple_asn1::to_der(block).map_err(|e| IssuanceError::signing(format!("extension: {e}")))
}

fn sign_client(
    params: CertificateParams,
    key_bits: usize,
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> IssuanceResult<SignedClient> {
    let ca_key = KeyPair::from_pem_and_sign_algo(&to_pkcs8_pem(ca_key_pem)?, &PKCS_RSA_SHA512)
        .map_err(|e| IssuanceError::signing(format!("unable to load CA private key: {e}")))?;
    ensure_key_matches(ca_cert_pem, &ca_key)?;
    let ca = CertificateParams::from_ca_cert_pem(ca_cert_pem)
        .and_then(|ca_params| ca_params.self_signed(&ca_key))
        .map_err(|e| IssuanceError::signing(format!("unable to load CA certificate: {e}")))?;

    let client_key = RsaPrivateKey::new(&mut rand::thread_rng(), key_bits)
        .map_err(|e| IssuanceError::signing(format!("key generation: {e}")))?;
    let key_pem = client_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| IssuanceError::signing(format!("key encoding: {e}")))?;
    let client_key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA512)
        .map_err(|e| IssuanceError::signing(format!("key encoding: {e}")))?;

    // rcgen rejects a serial number in a certificate request.
    let mut csr_params = params.clone();
    csr_params.serial_number = None;
    let csr_pem = csr_params
        .serialize_request(&client_key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| IssuanceError::signing(format!("certificate request: {e}")))?;

    let cert = params
        .signed_by(&client_key_pair, &ca, &ca_key)
        .map_err(|e| IssuanceError::signing(format!("CA signature: {e}")))?;

    Ok(SignedClient { key_pem, csr_pem, cert_pem: cert.pem() })
}

fn ensure_key_matches(ca_cert_pem: &str, ca_key: &KeyPair) -> IssuanceResult<()> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(ca_cert_pem.as_bytes())
        .map_err(|e| IssuanceError::signing(format!("unable to load CA certificate: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| IssuanceError::signing(format!("unable to load CA certificate: {e}")))?;
    if cert.public_key().raw != ca_key.public_key_der().as_slice() {
        return Err(IssuanceError::signing("CA certificate and private key do not match"));
    }
    Ok(())
}

/// Accept PKCS#8 or PKCS#1 RSA keys; rcgen only reads PKCS#8.
fn to_pkcs8_pem(pem: &str) -> IssuanceResult<Zeroizing<String>> {
    let key = RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| IssuanceError::signing(format!("unable to load CA private key: {e}")))?;
    key.to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| IssuanceError::signing(format!("unable to load CA private key: {e}")))
}

fn pem_contents(pem: &[u8], path: &Path) -> IssuanceResult<Vec<u8>> {
    x509_parser::pem::parse_x509_pem(pem)
        .map(|(_, pem)| pem.contents)
        .map_err(|e| IssuanceError::packaging(format!("{}: {e}", path.display())))
}

async fn read_to_string(path: impl Into<PathBuf>) -> IssuanceResult<String> {
    let path = path.into();
    tokio::fs::read_to_string(&path).await.map_err(|e| IssuanceError::filesystem(path, e))
}
