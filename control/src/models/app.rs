//! Application record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application lifecycle status as seen by the control core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Created,
    Deploying,
    Running,
    Failed,
}

/// Admin surface configuration for a deployed application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSurface {
    /// HTTPS base URL of the deployed application's admin API
    pub base_url: String,

    /// Protected admin-key blob, unwrapped to plaintext by the secret
    /// unwrap service before use
    pub admin_key_protected: String,
}

/// Application record, owned by an external repository and mutated here
/// only in the fields the deployment flow is responsible for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    /// Application ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Lifecycle status
    pub status: AppStatus,

    /// SHA-256 digest of the current API key; the plaintext key lives only
    /// in the injected runtime config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_digest: Option<String>,

    /// Hosting repository full name once deployed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,

    /// Set on first successful deployment push
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,

    /// Set on first successful database provisioning, never overwritten
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_provisioned_at: Option<DateTime<Utc>>,

    /// Admin surface configuration, absent until the app is reachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminSurface>,
}
