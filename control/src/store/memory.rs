//! In-memory store implementations

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::ControlError;
use crate::models::app::AppRecord;
use crate::models::connection::ConnectionRecord;
use crate::models::job::{DeploymentJob, JobStatus};
use crate::store::{AppDirectory, ConnectionStore, JobStore};

/// In-memory job store
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, DeploymentJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: DeploymentJob) -> Result<(), ControlError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<DeploymentJob>, ControlError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(job_id).cloned())
    }

    async fn update(&self, job: &DeploymentJob) -> Result<(), ControlError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if !jobs.contains_key(&job.id) {
            return Err(ControlError::NotFound(format!("job {}", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn next_queued(&self, limit: usize) -> Result<Vec<DeploymentJob>, ControlError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
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

/// In-memory connection store
#[derive(Default)]
pub struct MemoryConnectionStore {
    records: RwLock<HashMap<String, ConnectionRecord>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn get(&self, app_id: &str) -> Result<Option<ConnectionRecord>, ControlError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(app_id).cloned())
    }

    async fn insert_new(
        &self,
        record: ConnectionRecord,
    ) -> Result<ConnectionRecord, ControlError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        // First write wins; a concurrent provisioner's record is adopted
        let stored = records
            .entry(record.app_id.clone())
            .or_insert(record)
            .clone();
        Ok(stored)
    }

    async fn update(&self, record: &ConnectionRecord) -> Result<(), ControlError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.app_id.clone(), record.clone());
        Ok(())
    }
}

/// In-memory application directory
#[derive(Default)]
pub struct MemoryAppDirectory {
    apps: RwLock<HashMap<String, AppRecord>>,
}

impl MemoryAppDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an application record (test and bootstrap helper)
    pub fn put(&self, app: AppRecord) {
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        apps.insert(app.id.clone(), app);
    }
}

#[async_trait]
impl AppDirectory for MemoryAppDirectory {
    async fn get(&self, app_id: &str) -> Result<Option<AppRecord>, ControlError> {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        Ok(apps.get(app_id).cloned())
    }

    async fn update(&self, app: &AppRecord) -> Result<(), ControlError> {
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        apps.insert(app.id.clone(), app.clone());
        Ok(())
    }
}
