//! Persistence traits for jobs, connection records, and application records
//!
//! The data store is a collaborator the control core talks to through these
//! traits: file-backed implementations in production, in-memory ones in
//! tests.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::errors::ControlError;
use crate::models::app::AppRecord;
use crate::models::connection::ConnectionRecord;
use crate::models::job::DeploymentJob;

/// Store for deployment jobs (`DeploymentJobs` collection)
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: DeploymentJob) -> Result<(), ControlError>;

    async fn get(&self, job_id: &str) -> Result<Option<DeploymentJob>, ControlError>;

    async fn update(&self, job: &DeploymentJob) -> Result<(), ControlError>;

    /// Oldest queued jobs first, up to `limit`
    async fn next_queued(&self, limit: usize) -> Result<Vec<DeploymentJob>, ControlError>;
}

/// Store for per-application connection records (`ConnectionStrings`
/// collection). At most one record per application id.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get(&self, app_id: &str) -> Result<Option<ConnectionRecord>, ControlError>;

    /// Insert a record only if none exists for the app id; first write wins.
    /// Returns the stored record, which is the existing one when a
    /// concurrent insert got there first.
    async fn insert_new(&self, record: ConnectionRecord)
        -> Result<ConnectionRecord, ControlError>;

    async fn update(&self, record: &ConnectionRecord) -> Result<(), ControlError>;
}

/// Read/update access to application records, owned elsewhere
#[async_trait]
pub trait AppDirectory: Send + Sync {
    async fn get(&self, app_id: &str) -> Result<Option<AppRecord>, ControlError>;

    async fn update(&self, app: &AppRecord) -> Result<(), ControlError>;
}
