//! # Client Directory
//!
//! Lookup of client records by preshared secret. The issuance pipeline only
//! sees the [`ClientDirectory`] trait and reads `name` and `email` from the
//! record it gets back.
//!
//! Secrets are compared in constant time: both sides are fed through
//! HMAC-SHA256 under a per-process key and the tags are checked with
//! [`hmac::Mac::verify_slice`].

pub mod file;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::errors::issuance::{IssuanceError, IssuanceResult};

pub use file::FileDirectory;

type HmacSha256 = Hmac<Sha256>;

/// One client as stored by the VPN tooling that owns the directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub preshared_key: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub allocated_ips: Vec<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub extra_allowed_ips: Vec<String>,
    #[serde(default)]
    pub use_server_dns: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl std::fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("preshared_key", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Read-only lookup of client records.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// The enabled record whose preshared key equals `secret`, if any.
    ///
    /// `Ok(None)` means nobody matched. `Err` means the directory itself could
    /// not be read and says nothing about the secret.
    async fn lookup_by_preshared_secret(&self, secret: &str)
        -> IssuanceResult<Option<ClientRecord>>;
}

/// Constant-time equality for preshared secrets.
pub struct SecretMatcher {
    key: Zeroizing<[u8; 32]>,
}

impl SecretMatcher {
    pub fn new() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut key[..]);
        Self { key }
    }

    fn tag(&self, value: &str) -> IssuanceResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key[..])
            .map_err(|e| IssuanceError::directory(format!("secret comparison: {e}")))?;
        mac.update(value.as_bytes());
        Ok(mac)
    }

    /// Prepare a presented secret for repeated comparison.
    pub fn presented(&self, secret: &str) -> IssuanceResult<PresentedSecret> {
        let mut tag = Zeroizing::new([0u8; 32]);
        tag.copy_from_slice(&self.tag(secret)?.finalize().into_bytes());
        Ok(PresentedSecret { tag, empty: secret.is_empty() })
    }

    /// Whether `record` is enabled and holds the presented secret.
    pub fn matches(&self, presented: &PresentedSecret, record: &ClientRecord) -> IssuanceResult<bool> {
        if presented.empty || !record.enabled || record.preshared_key.is_empty() {
            return Ok(false);
        }
        Ok(self.tag(&record.preshared_key)?.verify_slice(&presented.tag[..]).is_ok())
    }
}

impl Default for SecretMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// HMAC tag of a secret under a [`SecretMatcher`]'s key.
pub struct PresentedSecret {
    tag: Zeroizing<[u8; 32]>,
    empty: bool,
}

/// Fixed set of records held in memory.
pub struct StaticDirectory {
    records: Vec<ClientRecord>,
    matcher: SecretMatcher,
}

impl StaticDirectory {
    pub fn new(records: Vec<ClientRecord>) -> Self {
        Self { records, matcher: SecretMatcher::new() }
    }
}

#[async_trait]
impl ClientDirectory for StaticDirectory {
    async fn lookup_by_preshared_secret(
        &self,
        secret: &str,
    ) -> IssuanceResult<Option<ClientRecord>> {
        let presented = self.matcher.presented(secret)?;
        for record in &self.records {
            if self.matcher.matches(&presented, record)? {
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) fn test_record(name: &str, preshared_key: &str) -> ClientRecord {
    ClientRecord {
        id: format!("id-{name}"),
        name: name.to_string(),
        email: format!("{name}@example.com"),
        preshared_key: preshared_key.to_string(),
        private_key: "wg-private".to_string(),
        allocated_ips: vec!["10.8.0.2".to_string()],
        allowed_ips: vec!["0.0.0.0/0".to_string()],
        extra_allowed_ips: Vec::new(),
        use_server_dns: false,
        enabled: true,
        created_at: None,
        updated_at: None,
    }
}
