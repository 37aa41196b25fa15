//! Durable bundle staging
//!
//! Bundles are fetched once at enqueue time and persisted under the staging
//! directory, so reprocessing never re-fetches. Staged files are removed on
//! successful deployment and kept for inspection on failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::fs;
use tracing::debug;

use crate::errors::ControlError;
use crate::models::job::BundleSource;

/// Staging area for bundle files
pub struct StagingArea {
    base_dir: PathBuf,
    max_bundle_bytes: u64,
    client: reqwest::Client,
}

impl StagingArea {
    /// Bundle transfer gets the long timeout class
    pub fn new(base_dir: impl Into<PathBuf>, max_bundle_bytes: u64) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            base_dir: base_dir.into(),
            max_bundle_bytes,
            client,
        })
    }

    /// Configured bundle size cap
    pub fn max_bundle_bytes(&self) -> u64 {
        self.max_bundle_bytes
    }

    /// Staged file path for a job
    pub fn bundle_path(&self, job_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.zip", job_id))
    }

    /// Resolve a bundle source to bytes, enforcing the size cap
    pub async fn fetch(&self, source: &BundleSource) -> Result<Vec<u8>, ControlError> {
        let bytes = match source {
            BundleSource::Url(url) => {
                debug!("Fetching bundle from {}", url);
                let response = self.client.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(ControlError::InvalidRequest(format!(
                        "bundle fetch failed with status {}",
                        response.status()
                    )));
                }
                if let Some(length) = response.content_length() {
                    if length > self.max_bundle_bytes {
                        return Err(ControlError::SizeLimitExceeded(format!(
                            "bundle is {} bytes, limit {}",
                            length, self.max_bundle_bytes
                        )));
                    }
                }
                response.bytes().await?.to_vec()
            }
            BundleSource::Inline(encoded) => BASE64.decode(encoded).map_err(|e| {
                ControlError::InvalidRequest(format!("inline bundle is not base64: {}", e))
            })?,
        };

        if bytes.len() as u64 > self.max_bundle_bytes {
            return Err(ControlError::SizeLimitExceeded(format!(
                "bundle is {} bytes, limit {}",
                bytes.len(),
                self.max_bundle_bytes
            )));
        }

        Ok(bytes)
    }

    /// Persist bundle bytes for a job, returning the staged path
    pub async fn save(&self, job_id: &str, bytes: &[u8]) -> Result<PathBuf, ControlError> {
        fs::create_dir_all(&self.base_dir).await?;
        let path = self.bundle_path(job_id);
        fs::write(&path, bytes).await?;
        debug!("Staged bundle for job {} at {}", job_id, path.display());
        Ok(path)
    }

    /// Load staged bundle bytes
    pub async fn load(&self, path: &Path) -> Result<Vec<u8>, ControlError> {
        let metadata = fs::metadata(path).await.map_err(|_| {
            ControlError::NotFound(format!("staged bundle {}", path.display()))
        })?;
        if metadata.len() > self.max_bundle_bytes {
            return Err(ControlError::SizeLimitExceeded(format!(
                "staged bundle is {} bytes, limit {}",
                metadata.len(),
                self.max_bundle_bytes
            )));
        }
        Ok(fs::read(path).await?)
    }

    /// Delete a staged bundle
    pub async fn remove(&self, path: &Path) -> Result<(), ControlError> {
        fs::remove_file(path).await?;
        Ok(())
    }
}
