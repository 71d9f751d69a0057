//! Ephemeral working directories for key material.
//!
//! A [`ResourceScope`] owns a uniquely named directory. The directory is
//! removed when the scope is closed, when the callback fails, and when the
//! enclosing future is dropped mid-flight, since removal is tied to the
//! guard's `Drop`.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::issuance::{IssuanceError, IssuanceResult};

/// Prefix for scope directory names.
pub const SCOPE_PREFIX: &str = "mtlsgate";

/// Guard over one ephemeral directory.
#[derive(Debug)]
pub struct ResourceScope {
    dir: TempDir,
}

impl ResourceScope {
    /// Create a fresh directory under `base`. On Unix it is only accessible
    /// by the current user.
    pub fn create(base: &Path) -> IssuanceResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCOPE_PREFIX);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o700));
        }
        let dir = builder.tempdir_in(base).map_err(|e| IssuanceError::filesystem(base, e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the scope. Nothing is created.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `contents` to `name` inside the scope with owner-only permissions.
    pub async fn write_file(
        &self,
        name: &str,
        contents: impl AsRef<[u8]>,
    ) -> IssuanceResult<PathBuf> {
        let path = self.file(name);
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file =
            options.open(&path).await.map_err(|e| IssuanceError::filesystem(&path, e))?;
        file.write_all(contents.as_ref())
            .await
            .map_err(|e| IssuanceError::filesystem(&path, e))?;
        file.flush().await.map_err(|e| IssuanceError::filesystem(&path, e))?;
        Ok(path)
    }

    /// Wrap key and certificate paths produced inside this scope.
    pub fn artifact(&self, private_key: PathBuf, certificate: PathBuf) -> CertificateArtifact<'_> {
        CertificateArtifact { private_key, certificate, _scope: PhantomData }
    }

    /// Remove the directory and everything in it.
    pub fn close(self) -> IssuanceResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| IssuanceError::filesystem(path, e))
    }
}

/// Signed certificate and its private key, both living inside a scope.
///
/// The lifetime ties the artifact to the [`ResourceScope`] that holds its
/// files, so it cannot outlive the directory.
#[derive(Debug)]
pub struct CertificateArtifact<'s> {
    private_key: PathBuf,
    certificate: PathBuf,
    _scope: PhantomData<&'s ResourceScope>,
}

impl CertificateArtifact<'_> {
    pub fn private_key_path(&self) -> &Path {
        &self.private_key
    }

    pub fn certificate_path(&self) -> &Path {
        &self.certificate
    }
}

/// Run `callback` inside a fresh scope under `base` and remove the scope afterwards.
///
/// If the callback fails and cleanup also fails, the callback's error is
/// returned and the cleanup failure is logged.
pub async fn with_scope<T, F>(base: &Path, callback: F) -> IssuanceResult<T>
where
    F: for<'s> FnOnce(&'s ResourceScope) -> BoxFuture<'s, IssuanceResult<T>>,
{
    let scope = ResourceScope::create(base)?;
    debug!(scope = %scope.path().display(), "Opened resource scope");

    let result = callback(&scope).await;
    let path = scope.path().to_path_buf();

    match (result, scope.close()) {
        (Ok(value), Ok(())) => {
            debug!(scope = %path.display(), "Closed resource scope");
            Ok(value)
        }
        (Ok(_), Err(cleanup)) => Err(cleanup),
        (Err(err), Ok(())) => {
            debug!(scope = %path.display(), error_kind = err.kind(), "Closed resource scope after failure");
            Err(err)
        }
        (Err(err), Err(cleanup)) => {
            warn!(
                scope = %path.display(),
                cleanup_error = %cleanup,
                "Failed to remove resource scope after issuance failure"
            );
            Err(err)
        }
    }
}
