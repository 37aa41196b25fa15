//! Deployment job models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment job status
///
/// Transitions are monotonic and one-directional:
/// `Queued -> Running -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Where the bundle bytes come from at enqueue time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum BundleSource {
    /// Fetch the bundle from a URL
    Url(String),
    /// Bundle supplied inline, base64 encoded
    Inline(String),
}

/// One attempt to deploy a bundle to a hosting repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentJob {
    /// Unique job ID
    pub id: String,

    /// Owning application ID
    pub app_id: String,

    /// User that requested the deployment
    pub user_id: String,

    /// Target repository name
    pub repo_name: String,

    /// Target branch
    pub branch: String,

    /// Commit message for the push
    pub commit_message: String,

    /// Bundle reference supplied at enqueue time
    pub bundle_source: BundleSource,

    /// Path of the staged bundle file, set once the bundle is persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_path: Option<PathBuf>,

    /// Current status
    pub status: JobStatus,

    /// Repository URL once created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,

    /// Repository full name (`owner/name`) once created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_full_name: Option<String>,

    /// Correlation ID propagated on every remote call for this job
    pub correlation_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set when processing starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set when the job reaches a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Human-readable failure message for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
