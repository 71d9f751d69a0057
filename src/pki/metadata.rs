//! CA metadata extraction.
//!
//! Two readers feed the same [`CaInfo`] assembly:
//! - [`parse_decoded_certificate`] works on the human-readable dump printed by
//!   `openssl x509 -noout -text`.
//! - [`parse_pem_certificate`] decodes the DER certificate directly.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::debug;
use x509_parser::prelude::*;

use super::{CaInfo, CertificateAuthority};
use crate::errors::issuance::{IssuanceError, IssuanceResult};

const SUBJECT_MARKER: &str = "Subject:";
const NOT_AFTER_MARKER: &str = "Not After";
const OPENSSL_TIME_FORMAT: &str = "%b %d %H:%M:%S %Y GMT";

/// Read the CA certificate at `ca_cert` through `authority`.
pub async fn extract_ca_data(
    authority: &dyn CertificateAuthority,
    ca_cert: &Path,
) -> IssuanceResult<CaInfo> {
    let info = authority.extract_metadata(ca_cert).await?;
    debug!(
        backend = authority.name(),
        ca_cert = %ca_cert.display(),
        organization = ?info.organization,
        not_after = %info.not_after,
        "Extracted CA metadata"
    );
    Ok(info)
}

/// Parse the text form of a certificate (`openssl x509 -noout -text`).
pub fn parse_decoded_certificate(text: &str, path: &Path) -> IssuanceResult<CaInfo> {
    let subject_line = text
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(SUBJECT_MARKER))
        .ok_or_else(|| IssuanceError::metadata(path, "subject line not found"))?;

    let attributes = split_subject(&subject_line[SUBJECT_MARKER.len()..])
        .map_err(|reason| IssuanceError::metadata(path, reason))?;

    let not_after_line = text
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(NOT_AFTER_MARKER))
        .ok_or_else(|| IssuanceError::metadata(path, "expiry line not found"))?;

    let (_, raw_time) = not_after_line
        .split_once(':')
        .ok_or_else(|| IssuanceError::metadata(path, "expiry line has no value"))?;

    let not_after = parse_openssl_time(raw_time).ok_or_else(|| {
        IssuanceError::metadata(path, format!("unrecognised expiry '{}'", raw_time.trim()))
    })?;

    Ok(CaInfo::from_attributes(attributes, not_after))
}

/// Split `C = US, ST = CA, O = Acme\, Inc.` into key/value pairs.
///
/// A component without `=` continues the previous value: OpenSSL escapes
/// commas inside values as `\,`, or quotes the whole value.
pub fn split_subject(subject: &str) -> Result<Vec<(String, String)>, String> {
    if subject.trim().is_empty() {
        return Err("subject is empty".to_string());
    }

    let mut attributes: Vec<(String, String)> = Vec::new();
    for component in subject.split(',') {
        match component.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                if key.is_empty() {
                    return Err(format!("subject component '{}' has no key", component.trim()));
                }
                attributes.push((key.to_string(), value.trim().to_string()));
            }
            None => match attributes.last_mut() {
                Some((_, value)) => {
                    if value.ends_with('\\') {
                        value.pop();
                    }
                    value.push(',');
                    value.push_str(component.trim_end());
                }
                None => {
                    return Err(format!(
                        "subject component '{}' has no '=' separator",
                        component.trim()
                    ))
                }
            },
        }
    }

    for (_, value) in &mut attributes {
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            *value = inner.to_string();
        }
    }

    Ok(attributes)
}

/// Parse OpenSSL's `Jan  1 00:00:00 2030 GMT` timestamps.
pub fn parse_openssl_time(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, OPENSSL_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Decode a PEM certificate and read subject attributes by OID.
pub fn parse_pem_certificate(pem: &[u8], path: &Path) -> IssuanceResult<CaInfo> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|e| IssuanceError::metadata(path, format!("invalid PEM: {e}")))?;
    let (_, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| IssuanceError::metadata(path, format!("invalid certificate: {e}")))?;

    let mut attributes = Vec::new();
    for attribute in cert.subject().iter_attributes() {
        let Some(key) = short_name(&attribute.attr_type().to_id_string()) else {
            continue;
        };
        let value = attribute.as_str().map_err(|e| {
            IssuanceError::metadata(path, format!("subject attribute {key} is not a string: {e}"))
        })?;
        attributes.push((key, value.to_string()));
    }

    if attributes.is_empty() {
        return Err(IssuanceError::metadata(path, "subject has no recognised attributes"));
    }

    let not_after = Utc
        .timestamp_opt(cert.validity().not_after.timestamp(), 0)
        .single()
        .ok_or_else(|| IssuanceError::metadata(path, "expiry out of range"))?;

    Ok(CaInfo::from_attributes(attributes, not_after))
}

fn short_name(oid: &str) -> Option<&'static str> {
    match oid {
        "2.5.4.3" => Some("CN"),
        "2.5.4.6" => Some("C"),
        "2.5.4.7" => Some("L"),
        "2.5.4.8" => Some("ST"),
        "2.5.4.10" => Some("O"),
        "2.5.4.11" => Some("OU"),
        "1.2.840.113549.1.9.1" => Some("emailAddress"),
        _ => None,
    }
}
