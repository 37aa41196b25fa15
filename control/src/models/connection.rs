//! Connection record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Provisioning,
    Active,
    Failed,
}

/// One row per application: the provisioned database and the opaque handle
/// to its connection string. The handle is resolved to a secret elsewhere;
/// a raw connection string is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Owning application ID
    pub app_id: String,

    /// Provisioned database name
    pub database_name: String,

    /// Opaque connection-string reference
    pub connection_secret_ref: String,

    /// Record status
    pub status: ConnectionStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// A record is usable when both the database name and the connection
    /// reference are present
    pub fn is_provisioned(&self) -> bool {
        !self.database_name.is_empty() && !self.connection_secret_ref.is_empty()
    }
}
