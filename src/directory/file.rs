use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ClientDirectory, ClientRecord, SecretMatcher};
use crate::errors::issuance::{IssuanceError, IssuanceResult};

const RECORD_EXTENSION: &str = "json";

/// Directory of `*.json` client records, one per file.
///
/// Files are re-read on every lookup so records added or disabled by the
/// owning tool take effect immediately. Any unreadable or corrupt record
/// fails the lookup.
pub struct FileDirectory {
    root: PathBuf,
    matcher: SecretMatcher,
}

impl FileDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), matcher: SecretMatcher::new() }
    }

    async fn record_paths(&self) -> IssuanceResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            IssuanceError::directory_with_source(
                format!("unable to list {}", self.root.display()),
                e,
            )
        })?;

        let mut paths = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| {
                IssuanceError::directory_with_source(
                    format!("unable to list {}", self.root.display()),
                    e,
                )
            })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            paths.push(path);
        }

        paths.sort();
        Ok(paths)
    }

    async fn read_record(path: &Path) -> IssuanceResult<ClientRecord> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            IssuanceError::directory_with_source(format!("unable to read {}", path.display()), e)
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            IssuanceError::directory_with_source(format!("corrupt record {}", path.display()), e)
        })
    }
}

#[async_trait]
impl ClientDirectory for FileDirectory {
    async fn lookup_by_preshared_secret(
        &self,
        secret: &str,
    ) -> IssuanceResult<Option<ClientRecord>> {
        let presented = self.matcher.presented(secret)?;
        let paths = self.record_paths().await?;

        let mut found = None;
        for path in &paths {
            let record = Self::read_record(path).await.inspect_err(|e| {
                warn!(error = %e, "Client record could not be loaded");
            })?;
            // Read every record; lookup time must not depend on match position.
            if found.is_none() && self.matcher.matches(&presented, &record)? {
                found = Some(record);
            }
        }

        debug!(records = paths.len(), matched = found.is_some(), "Client directory lookup");
        Ok(found)
    }
}
