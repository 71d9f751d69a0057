//! Issuance orchestration
//!
//! Turns a presented preshared secret into a PKCS#12 bundle: authenticate
//! against the client directory, then sign and package inside one resource
//! scope. This is the only component that talks to the directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, Instrument};

use crate::config::AppConfig;
use crate::directory::{ClientDirectory, ClientRecord, FileDirectory};
use crate::errors::issuance::{IssuanceError, IssuanceResult};
use crate::observability::MetricsRecorder;
use crate::pki::{
    build_authority, bundle_filename, with_scope, BundlePackager, CertificateAuthority,
    CertificateSigner, IssuanceRequest,
};

/// Shown to a requester whose secret matched no enabled client.
pub const DENIED_MESSAGE: &str = "Preshared key not valid";

/// Shown to a requester when issuance failed for any other reason.
pub const FAILED_REASON: &str = "Certificate issuance failed, please contact an administrator";

/// Result of one request. Never carries internal error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceOutcome {
    Denied { message: String },
    Packaged { bundle: Vec<u8>, filename: String },
    Failed { reason: String },
}

impl IssuanceOutcome {
    /// Label used for metrics and the issuance span.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Denied { .. } => "denied",
            Self::Packaged { .. } => "packaged",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Everything the orchestrator reads from configuration, fixed at construction.
#[derive(Debug, Clone)]
struct IssuancePolicy {
    validity_days: u32,
    ca_cert: PathBuf,
    ca_key: PathBuf,
    work_dir: PathBuf,
}

/// Composes directory lookup, signing and packaging for one secret at a time.
pub struct IssuanceOrchestrator {
    policy: IssuancePolicy,
    directory: Arc<dyn ClientDirectory>,
    authority: Arc<dyn CertificateAuthority>,
    signer: CertificateSigner,
    packager: BundlePackager,
    permits: Semaphore,
    in_flight: AtomicUsize,
    metrics: MetricsRecorder,
}

impl IssuanceOrchestrator {
    pub fn new(
        config: &AppConfig,
        directory: Arc<dyn ClientDirectory>,
        authority: Arc<dyn CertificateAuthority>,
    ) -> Self {
        let policy = IssuancePolicy {
            validity_days: config.issuance.validity_days,
            ca_cert: config.ca.cert_path.clone(),
            ca_key: config.ca.key_path.clone(),
            work_dir: config.issuance.work_dir(),
        };

        Self {
            policy,
            directory,
            signer: CertificateSigner::new(authority.clone()),
            packager: BundlePackager::new(authority.clone()),
            authority,
            permits: Semaphore::new(config.issuance.max_concurrent_issuances),
            in_flight: AtomicUsize::new(0),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Backend name, for logs and health output.
    pub fn backend(&self) -> &'static str {
        self.authority.name()
    }

    /// Authenticate `secret` and, on success, issue and package a bundle.
    ///
    /// Every failure after authentication collapses into
    /// [`IssuanceOutcome::Failed`] with a generic reason; the error itself is
    /// logged. Any scratch directory is gone by the time this returns.
    pub async fn issue_for_secret(&self, secret: &str) -> IssuanceOutcome {
        let span = crate::issuance_span!(self.authority.name());
        let started = Instant::now();

        let outcome = async {
            let client = match self.authenticate(secret).await {
                Ok(client) => client,
                Err(err) if err.is_user_correctable() => {
                    info!("Preshared key did not match an enabled client");
                    return IssuanceOutcome::Denied { message: DENIED_MESSAGE.to_string() };
                }
                Err(err) => return self.failed(err),
            };

            tracing::Span::current().record("client", client.name.as_str());

            match self.issue_for_identity(&client.name, &client.email).await {
                Ok((bundle, filename)) => {
                    info!(filename = %filename, bytes = bundle.len(), "Issued client bundle");
                    IssuanceOutcome::Packaged { bundle, filename }
                }
                Err(err) => self.failed(err),
            }
        }
        .instrument(span.clone())
        .await;

        span.record("outcome", outcome.label());
        self.metrics.record_issuance(outcome.label(), started.elapsed());
        outcome
    }

    async fn authenticate(&self, secret: &str) -> IssuanceResult<ClientRecord> {
        self.directory
            .lookup_by_preshared_secret(secret)
            .await?
            .ok_or(IssuanceError::LookupMiss)
    }

    /// Issue and package a bundle for `name <email>` without a directory lookup.
    ///
    /// Returns the bundle and its download filename. Used by the request path
    /// after authentication and by the `issue` command.
    pub async fn issue_for_identity(
        &self,
        name: &str,
        email: &str,
    ) -> IssuanceResult<(Vec<u8>, String)> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| IssuanceError::signing(format!("admission closed: {e}")))?;
        let _in_flight = InFlight::enter(&self.in_flight, &self.metrics);

        let request = IssuanceRequest {
            client_email: email.to_string(),
            validity_days: self.policy.validity_days,
            ca_cert: self.policy.ca_cert.clone(),
            ca_key: self.policy.ca_key.clone(),
        };
        let friendly_name = name.to_string();
        let signer = self.signer.clone();
        let packager = self.packager.clone();

        debug!(validity_days = request.validity_days, "Starting scoped issuance");
        let bundle = with_scope(&self.policy.work_dir, move |scope| {
            Box::pin(async move {
                let artifact = signer.issue_certificate(&request, scope).await?;
                let bundle =
                    packager.package_bundle(&artifact, &request.ca_cert, &friendly_name).await?;
                Ok::<_, IssuanceError>(bundle)
            })
        })
        .await?;

        Ok((bundle, bundle_filename(name)))
    }

    fn failed(&self, err: IssuanceError) -> IssuanceOutcome {
        error!(error = %err, error_kind = err.kind(), "Certificate issuance failed");
        self.metrics.record_failure(err.kind());
        IssuanceOutcome::Failed { reason: FAILED_REASON.to_string() }
    }
}

/// Keeps the in-flight gauge accurate when an issuance is cancelled.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
    metrics: &'a MetricsRecorder,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, metrics: &'a MetricsRecorder) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        metrics.set_in_flight(now);
        Self { counter, metrics }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let now = self.counter.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.set_in_flight(now);
    }
}

/// Wire the file directory and configured CA backend into an orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> IssuanceOrchestrator {
    let directory = Arc::new(FileDirectory::new(config.directory.clients_dir.clone()));
    let authority = build_authority(&config.ca);
    IssuanceOrchestrator::new(config, directory, authority)
}
