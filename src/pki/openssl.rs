//! `openssl` command line backend.
//!
//! Every operation is one subprocess: arguments in, stdout captured as the
//! result, a non-zero exit turned into an error carrying stderr. Children are
//! killed if the awaiting future is dropped.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::metadata::parse_decoded_certificate;
use super::{
    CaInfo, CertificateArtifact, CertificateAuthority, CertificateSubject, ResourceScope,
    SigningRequest, BUNDLE_PASSWORD, CERT_FILE, CSR_CONFIG_FILE, CSR_FILE, KEY_FILE,
    RSA_KEY_BITS,
};
use crate::errors::issuance::{IssuanceError, IssuanceResult};

/// Section of the generated config holding the client extensions.
const EXTENSIONS_SECTION: &str = "req_ext";

#[derive(Debug, Clone)]
pub struct OpensslAuthority {
    binary: PathBuf,
    legacy_pkcs12: bool,
}

impl OpensslAuthority {
    /// `legacy_pkcs12` adds `-legacy` to exports; OpenSSL 1.1 does not know the flag.
    pub fn new(binary: impl Into<PathBuf>, legacy_pkcs12: bool) -> Self {
        Self { binary: binary.into(), legacy_pkcs12 }
    }

    async fn run<I, S>(&self, args: I) -> Result<Vec<u8>, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("openssl exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl CertificateAuthority for OpensslAuthority {
    fn name(&self) -> &'static str {
        "openssl"
    }

    #[instrument(skip_all, fields(ca_cert = %ca_cert.display()))]
    async fn extract_metadata(&self, ca_cert: &Path) -> IssuanceResult<CaInfo> {
        let stdout = self
            .run([
                OsStr::new("x509"),
                OsStr::new("-in"),
                ca_cert.as_os_str(),
                OsStr::new("-noout"),
                OsStr::new("-text"),
            ])
            .await
            .map_err(|reason| IssuanceError::metadata(ca_cert, reason))?;

        let text = String::from_utf8_lossy(&stdout);
        parse_decoded_certificate(&text, ca_cert)
    }

    async fn issue<'s>(
        &self,
        request: &SigningRequest<'_>,
        scope: &'s ResourceScope,
    ) -> IssuanceResult<CertificateArtifact<'s>> {
        let config = render_csr_config(&request.subject, &request.san_dns);
        let config_path = scope.write_file(CSR_CONFIG_FILE, config).await?;
        let key_path = scope.file(KEY_FILE);
        let csr_path = scope.file(CSR_FILE);
        let cert_path = scope.file(CERT_FILE);
        let days = request.validity_days.to_string();
        let new_key = format!("rsa:{RSA_KEY_BITS}");

        self.run([
            OsStr::new("req"),
            OsStr::new("-new"),
            OsStr::new("-utf8"),
            OsStr::new("-nodes"),
            OsStr::new("-newkey"),
            OsStr::new(&new_key),
            OsStr::new("-keyout"),
            key_path.as_os_str(),
            OsStr::new("-days"),
            OsStr::new(&days),
            OsStr::new("-config"),
            config_path.as_os_str(),
            OsStr::new("-out"),
            csr_path.as_os_str(),
        ])
        .await
        .map_err(|e| IssuanceError::signing(format!("certificate request: {e}")))?;
        debug!("Generated client key and certificate request");

        let serial = format!("0x{:x}", request.serial);
        self.run([
            OsStr::new("x509"),
            OsStr::new("-req"),
            OsStr::new("-sha512"),
            OsStr::new("-days"),
            OsStr::new(&days),
            OsStr::new("-set_serial"),
            OsStr::new(&serial),
            OsStr::new("-extensions"),
            OsStr::new(EXTENSIONS_SECTION),
            OsStr::new("-extfile"),
            config_path.as_os_str(),
            OsStr::new("-CA"),
            request.ca_cert.as_os_str(),
            OsStr::new("-CAkey"),
            request.ca_key.as_os_str(),
            OsStr::new("-in"),
            csr_path.as_os_str(),
            OsStr::new("-out"),
            cert_path.as_os_str(),
        ])
        .await
        .map_err(|e| IssuanceError::signing(format!("CA signature: {e}")))?;

        if !cert_path.is_file() {
            return Err(IssuanceError::signing("openssl reported success but wrote no certificate"));
        }

        Ok(scope.artifact(key_path, cert_path))
    }

    async fn package(
        &self,
        artifact: &CertificateArtifact<'_>,
        ca_cert: &Path,
        friendly_name: &str,
    ) -> IssuanceResult<Vec<u8>> {
        let passout = format!("pass:{BUNDLE_PASSWORD}");
        let mut args = vec![
            OsStr::new("pkcs12"),
            OsStr::new("-export"),
            OsStr::new("-in"),
            artifact.certificate_path().as_os_str(),
            OsStr::new("-certfile"),
            ca_cert.as_os_str(),
            OsStr::new("-inkey"),
            artifact.private_key_path().as_os_str(),
            OsStr::new("-passout"),
            OsStr::new(&passout),
            OsStr::new("-name"),
            OsStr::new(friendly_name),
        ];
        if self.legacy_pkcs12 {
            args.push(OsStr::new("-legacy"));
        }

        self.run(args).await.map_err(IssuanceError::packaging)
    }
}

/// Render the request config fed to `openssl req` and `openssl x509 -extfile`.
pub fn render_csr_config(subject: &CertificateSubject, san_dns: &str) -> String {
    let mut config = String::new();
    let _ = writeln!(config, "[req]");
    let _ = writeln!(config, "default_bits = {RSA_KEY_BITS}");
    let _ = writeln!(config, "distinguished_name = dn");
    let _ = writeln!(config, "prompt = no");
    let _ = writeln!(config, "string_mask = utf8only");
    let _ = writeln!(config, "req_extensions = {EXTENSIONS_SECTION}");
    let _ = writeln!(config);
    let _ = writeln!(config, "[dn]");
    for (key, value) in subject.attributes() {
        let _ = writeln!(config, "{key}=\"{}\"", escape_config_value(value));
    }
    let _ = writeln!(config);
    let _ = writeln!(config, "[{EXTENSIONS_SECTION}]");
    let _ = writeln!(config, "subjectAltName = @alt_names");
    let _ = writeln!(config, "basicConstraints = critical, CA:false");
    let _ = writeln!(config, "keyUsage = critical, digitalSignature, keyAgreement");
    let _ = writeln!(config, "extendedKeyUsage = critical, clientAuth");
    let _ = writeln!(config);
    let _ = writeln!(config, "[alt_names]");
    let _ = writeln!(config, "DNS.0 = {}", escape_config_value(san_dns));
    config
}

// `$` starts a variable reference in OpenSSL config files.
fn escape_config_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
