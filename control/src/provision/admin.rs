//! Database administration interface
//!
//! Validator and index application and seeding reach the provisioned
//! database through the provisioning agent's command envelope; no document
//! store driver is linked here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::ControlError;
use crate::provision::agent::{AgentCommand, ProvisioningAgent};
use crate::schema::IndexSpec;

/// Outcome of a bulk document insert
#[derive(Debug, Clone, Default)]
pub struct BulkInsertOutcome {
    /// Documents written
    pub inserted: usize,

    /// Documents skipped because their key already existed
    pub duplicates: usize,

    /// Non-duplicate per-document failures
    pub errors: Vec<String>,
}

/// Administrative operations against a provisioned database
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Create a collection with the given validator; fails with
    /// `ControlError::AlreadyExists` when the collection is present
    async fn create_collection(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        validator: &Value,
    ) -> Result<(), ControlError>;

    /// Replace the validator of an existing collection in place
    async fn modify_collection(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        validator: &Value,
    ) -> Result<(), ControlError>;

    /// Names of the collection's existing indexes
    async fn index_names(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
    ) -> Result<Vec<String>, ControlError>;

    async fn create_index(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        spec: &IndexSpec,
    ) -> Result<(), ControlError>;

    /// Unordered bulk insert; duplicate keys are reported, not raised
    async fn bulk_insert(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        documents: &[Value],
    ) -> Result<BulkInsertOutcome, ControlError>;
}

/// Database administration routed through the provisioning agent
pub struct AgentDatabaseAdmin {
    agent: Arc<dyn ProvisioningAgent>,

    /// Admin connection string override forwarded to the agent when set
    admin_connection_override: Option<String>,
}

impl AgentDatabaseAdmin {
    pub fn new(agent: Arc<dyn ProvisioningAgent>, admin_connection_override: Option<String>) -> Self {
        Self {
            agent,
            admin_connection_override,
        }
    }

    fn command(&self, app_id: &str, command_type: &str, mut payload: Value) -> AgentCommand {
        if let Some(override_cs) = &self.admin_connection_override {
            if let Some(map) = payload.as_object_mut() {
                map.insert(
                    "adminConnectionString".to_string(),
                    Value::String(override_cs.clone()),
                );
            }
        }
        // Admin commands run outside any deployment job; mint one id that
        // serves as both the envelope job id and the correlation header
        let correlation_id = crate::utils::generate_correlation_id();
        AgentCommand {
            job_id: correlation_id.clone(),
            app_id: app_id.to_string(),
            command_type: command_type.to_string(),
            payload,
            correlation_id,
        }
    }

    fn classify(response: crate::provision::agent::AgentResponse) -> Result<Value, ControlError> {
        if response.success {
            return Ok(response.data.unwrap_or(Value::Null));
        }
        let message = response.error_message.unwrap_or_default();
        match response.error_code.as_deref() {
            Some("AlreadyExists") => Err(ControlError::AlreadyExists(message)),
            _ => Err(ControlError::Internal(message)),
        }
    }
}

#[async_trait]
impl DatabaseAdmin for AgentDatabaseAdmin {
    async fn create_collection(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        validator: &Value,
    ) -> Result<(), ControlError> {
        let payload = json!({
            "databaseName": database,
            "collection": collection,
            "validator": validator,
        });
        let response = self
            .agent
            .send_command(self.command(app_id, "CreateCollection", payload))
            .await?;
        Self::classify(response).map(|_| ())
    }

    async fn modify_collection(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        validator: &Value,
    ) -> Result<(), ControlError> {
        let payload = json!({
            "databaseName": database,
            "collection": collection,
            "validator": validator,
        });
        let response = self
            .agent
            .send_command(self.command(app_id, "ModifyCollection", payload))
            .await?;
        Self::classify(response).map(|_| ())
    }

    async fn index_names(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
    ) -> Result<Vec<String>, ControlError> {
        let payload = json!({
            "databaseName": database,
            "collection": collection,
        });
        let response = self
            .agent
            .send_command(self.command(app_id, "ListIndexes", payload))
            .await?;
        let data = Self::classify(response)?;
        let names = data
            .get("indexes")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn create_index(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        spec: &IndexSpec,
    ) -> Result<(), ControlError> {
        let payload = json!({
            "databaseName": database,
            "collection": collection,
            "name": spec.name,
            "field": spec.field,
            "unique": spec.unique,
        });
        let response = self
            .agent
            .send_command(self.command(app_id, "CreateIndex", payload))
            .await?;
        Self::classify(response).map(|_| ())
    }

    async fn bulk_insert(
        &self,
        app_id: &str,
        database: &str,
        collection: &str,
        documents: &[Value],
    ) -> Result<BulkInsertOutcome, ControlError> {
        let payload = json!({
            "databaseName": database,
            "collection": collection,
            "documents": documents,
            "ordered": false,
        });
        let response = self
            .agent
            .send_command(self.command(app_id, "InsertDocuments", payload))
            .await?;
        let data = Self::classify(response)?;

        Ok(BulkInsertOutcome {
            inserted: data.get("inserted").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            duplicates: data.get("duplicates").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            errors: data
                .get("errors")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|e| e.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
