//! Shared fixtures for integration tests: a throwaway CA on disk and helpers
//! for reading back what the issuance pipeline produced.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use mtlsgate::config::{AppConfig, CaBackend};
use mtlsgate::directory::ClientRecord;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, Ia5String, IsCa,
    KeyPair, KeyUsagePurpose, PKCS_RSA_SHA256,
};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};

/// Smallest RSA size ring will sign with; keeps the suite fast.
pub const TEST_KEY_BITS: usize = 2048;

pub const CA_COUNTRY: &str = "NZ";
pub const CA_STATE: &str = "Wellington";
pub const CA_LOCALITY: &str = "Te Aro";
pub const CA_ORGANIZATION: &str = "Example Networks, Ltd";
pub const CA_EMAIL: &str = "pki@example.net";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Pkcs8,
    Pkcs1,
}

/// A self-signed RSA CA written to a temporary directory.
pub struct TestCa {
    temp_dir: TempDir,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub cert_pem: String,
}

impl TestCa {
    /// CA valid from yesterday for one year, key stored as PKCS#8.
    pub fn new() -> anyhow::Result<Self> {
        let now = OffsetDateTime::now_utc();
        Self::build(
            now - Duration::days(1),
            now + Duration::days(365),
            KeyEncoding::Pkcs8,
            ca_subject(CA_LOCALITY, CA_ORGANIZATION)?,
        )
    }

    pub fn with_key_encoding(encoding: KeyEncoding) -> anyhow::Result<Self> {
        let now = OffsetDateTime::now_utc();
        Self::build(
            now - Duration::days(1),
            now + Duration::days(365),
            encoding,
            ca_subject(CA_LOCALITY, CA_ORGANIZATION)?,
        )
    }

    /// CA with its own locality and organization, e.g. non-ASCII names.
    pub fn with_names(locality: &str, organization: &str) -> anyhow::Result<Self> {
        let now = OffsetDateTime::now_utc();
        Self::build(
            now - Duration::days(1),
            now + Duration::days(365),
            KeyEncoding::Pkcs8,
            ca_subject(locality, organization)?,
        )
    }

    /// CA whose validity ended yesterday.
    pub fn expired() -> anyhow::Result<Self> {
        let now = OffsetDateTime::now_utc();
        Self::build(
            now - Duration::days(30),
            now - Duration::days(1),
            KeyEncoding::Pkcs8,
            ca_subject(CA_LOCALITY, CA_ORGANIZATION)?,
        )
    }

    fn build(
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
        encoding: KeyEncoding,
        subject: DistinguishedName,
    ) -> anyhow::Result<Self> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), TEST_KEY_BITS)
            .context("generate CA key")?;
        let pkcs8 = key.to_pkcs8_pem(LineEnding::LF).context("encode CA key")?;
        let key_pair =
            KeyPair::from_pem_and_sign_algo(&pkcs8, &PKCS_RSA_SHA256).context("load CA key")?;

        let mut params =
            CertificateParams::new(Vec::<String>::new()).context("build CA params")?;
        params.distinguished_name = subject;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.not_before = not_before;
        params.not_after = not_after;

        let cert = params.self_signed(&key_pair).context("self-sign CA")?;

        let temp_dir = TempDir::new().context("create temp dir")?;
        let cert_path = temp_dir.path().join("ca.crt");
        let key_path = temp_dir.path().join("ca.key");

        let cert_pem = cert.pem();
        fs::write(&cert_path, &cert_pem).context("write CA certificate")?;
        match encoding {
            KeyEncoding::Pkcs8 => fs::write(&key_path, pkcs8.as_bytes()),
            KeyEncoding::Pkcs1 => fs::write(
                &key_path,
                key.to_pkcs1_pem(LineEnding::LF).context("encode PKCS#1 key")?.as_bytes(),
            ),
        }
        .context("write CA key")?;

        Ok(Self { temp_dir, cert_path, key_path, cert_pem })
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Configuration pointing at this CA and the native backend.
    pub fn config(&self, work_dir: &Path, clients_dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.ca.backend = CaBackend::Native;
        config.ca.cert_path = self.cert_path.clone();
        config.ca.key_path = self.key_path.clone();
        config.issuance.work_dir = Some(work_dir.to_path_buf());
        config.issuance.validity_days = 30;
        config.directory.clients_dir = clients_dir.to_path_buf();
        config
    }

    /// DER of the CA certificate.
    pub fn cert_der(&self) -> Vec<u8> {
        pem_to_der(self.cert_pem.as_bytes())
    }
}

fn ca_subject(locality: &str, organization: &str) -> anyhow::Result<DistinguishedName> {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, CA_COUNTRY);
    dn.push(DnType::StateOrProvinceName, CA_STATE);
    dn.push(DnType::LocalityName, locality);
    dn.push(DnType::OrganizationName, organization);
    dn.push(DnType::CommonName, "Example Test CA");
    dn.push(
        DnType::CustomDnType(vec![1, 2, 840, 113549, 1, 9, 1]),
        DnValue::Ia5String(Ia5String::try_from(CA_EMAIL).context("CA email")?),
    );
    Ok(dn)
}

pub fn pem_to_der(pem: &[u8]) -> Vec<u8> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem).expect("valid PEM");
    pem.contents
}

/// Client record in the on-disk directory format.
pub fn client_record(name: &str, email: &str, preshared_key: &str) -> ClientRecord {
    serde_json::from_value(serde_json::json!({
        "id": format!("{name}-id"),
        "name": name,
        "email": email,
        "preshared_key": preshared_key,
        "private_key": "wg-private-key",
        "allocated_ips": ["10.8.0.2"],
        "allowed_ips": ["0.0.0.0/0"],
        "extra_allowed_ips": [],
        "use_server_dns": true,
        "enabled": true,
        "created_at": "2024-01-01T00:00:00.000Z",
        "updated_at": "2024-01-01T00:00:00.000Z"
    }))
    .expect("valid client record")
}

/// Write `record` as `<id>.json` under `dir`.
pub fn write_client(dir: &Path, record: &ClientRecord) {
    let path = dir.join(format!("{}.json", record.id));
    fs::write(path, serde_json::to_vec_pretty(record).expect("serialize record"))
        .expect("write record");
}

/// True when `dir` has no entries left.
pub fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).expect("read dir").next().is_none()
}
