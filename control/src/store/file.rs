//! File-backed store implementations
//!
//! Each collection is one JSON document rewritten through a temp file on
//! every mutation, so queued jobs and connection records survive a process
//! restart. Volume here is a handful of records, not thousands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::ControlError;
use crate::models::connection::ConnectionRecord;
use crate::models::job::{DeploymentJob, JobStatus};
use crate::store::{ConnectionStore, JobStore};

async fn read_collection<T: DeserializeOwned>(
    path: &Path,
) -> Result<HashMap<String, T>, ControlError> {
    if fs::metadata(path).await.is_err() {
        return Ok(HashMap::new());
    }
    let contents = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write-then-rename, so a crash mid-write never truncates the collection
async fn write_collection<T: Serialize>(
    path: &Path,
    entries: &HashMap<String, T>,
) -> Result<(), ControlError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let rendered = serde_json::to_string_pretty(entries)?;
    let staged = path.with_extension("tmp");
    fs::write(&staged, rendered).await?;
    fs::rename(&staged, path).await?;
    Ok(())
}

/// Durable job store over one JSON file
pub struct FileJobStore {
    path: PathBuf,
    jobs: RwLock<HashMap<String, DeploymentJob>>,
}

impl FileJobStore {
    /// Open the store, loading any jobs persisted by a previous run
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ControlError> {
        let path = path.into();
        let jobs = read_collection(&path).await?;
        debug!("Loaded {} deployment jobs from {}", jobs.len(), path.display());
        Ok(Self {
            path,
            jobs: RwLock::new(jobs),
        })
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn insert(&self, job: DeploymentJob) -> Result<(), ControlError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job);
        write_collection(&self.path, &jobs).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<DeploymentJob>, ControlError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).cloned())
    }

    async fn update(&self, job: &DeploymentJob) -> Result<(), ControlError> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(ControlError::NotFound(format!("job {}", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        write_collection(&self.path, &jobs).await
    }

    async fn next_queued(&self, limit: usize) -> Result<Vec<DeploymentJob>, ControlError> {
        let jobs = self.jobs.read().await;
        let mut queued: Vec<DeploymentJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        queued.truncate(limit);
        Ok(queued)
    }
}

/// Durable connection store over one JSON file
pub struct FileConnectionStore {
    path: PathBuf,
    records: RwLock<HashMap<String, ConnectionRecord>>,
}

impl FileConnectionStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ControlError> {
        let path = path.into();
        let records = read_collection(&path).await?;
        debug!(
            "Loaded {} connection records from {}",
            records.len(),
            path.display()
        );
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }
}

#[async_trait]
impl ConnectionStore for FileConnectionStore {
    async fn get(&self, app_id: &str) -> Result<Option<ConnectionRecord>, ControlError> {
        let records = self.records.read().await;
        Ok(records.get(app_id).cloned())
    }

    async fn insert_new(
        &self,
        record: ConnectionRecord,
    ) -> Result<ConnectionRecord, ControlError> {
        let mut records = self.records.write().await;
        // First write wins; a concurrent provisioner's record is adopted
        if let Some(existing) = records.get(&record.app_id) {
            return Ok(existing.clone());
        }
        records.insert(record.app_id.clone(), record.clone());
        write_collection(&self.path, &records).await?;
        Ok(record)
    }

    async fn update(&self, record: &ConnectionRecord) -> Result<(), ControlError> {
        let mut records = self.records.write().await;
        records.insert(record.app_id.clone(), record.clone());
        write_collection(&self.path, &records).await
    }
}
