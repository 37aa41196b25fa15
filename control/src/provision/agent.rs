//! Provisioning agent client
//!
//! The agent is the external service that actually creates database
//! instances and executes database administration commands; this core only
//! sends commands and records results.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::ControlError;

/// Command envelope accepted by the provisioning agent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCommand {
    pub job_id: String,
    pub app_id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    pub payload: Value,

    /// Sent as the `x-correlation-id` header, not part of the envelope body
    #[serde(skip)]
    pub correlation_id: String,
}

/// Database details returned after provisioning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoUpdate {
    pub connection_string_secret_ref: String,
    pub database_name: String,
}

/// `update` section of an agent response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    #[serde(default)]
    pub mongo: Option<MongoUpdate>,
}

/// Response envelope from the provisioning agent
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub success: bool,

    #[serde(default)]
    pub error_message: Option<String>,

    /// Machine-readable error class, e.g. "AlreadyExists", "DuplicateKey"
    #[serde(default)]
    pub error_code: Option<String>,

    #[serde(default)]
    pub update: Option<AgentUpdate>,

    /// Command-specific result data
    #[serde(default)]
    pub data: Option<Value>,
}

/// Outcome of a provisioning request, shaped for the engine
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub database_name: Option<String>,
    pub connection_secret_ref: Option<String>,
}

/// Remote provisioning agent interface
#[async_trait]
pub trait ProvisioningAgent: Send + Sync {
    /// Request creation of a dedicated database, passing the candidate name
    /// and optional schema/seed payloads
    async fn provision_database(
        &self,
        job_id: &str,
        correlation_id: &str,
        app_id: &str,
        database_name: &str,
        schema_json: Option<String>,
        seed_json: Option<String>,
    ) -> Result<ProvisionOutcome, ControlError>;

    /// Execute an arbitrary administration command against an app's database
    async fn send_command(&self, command: AgentCommand) -> Result<AgentResponse, ControlError>;
}

/// HTTP implementation talking to the provisioning agent endpoint
pub struct HttpProvisioningAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpProvisioningAgent {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ControlError> {
        if base_url.is_empty() {
            return Err(ControlError::NotConfigured(
                "provisioning agent base URL".to_string(),
            ));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post_command(&self, command: &AgentCommand) -> Result<AgentResponse, ControlError> {
        let url = format!("{}/commands", self.base_url);
        debug!("POST {} ({})", url, command.command_type);

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", self.api_key.expose_secret())
            .header("x-correlation-id", &command.correlation_id)
            .json(command)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ControlError::Internal(format!(
                "provisioning agent error ({}): {}",
                status, body
            )));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl ProvisioningAgent for HttpProvisioningAgent {
    async fn provision_database(
        &self,
        job_id: &str,
        correlation_id: &str,
        app_id: &str,
        database_name: &str,
        schema_json: Option<String>,
        seed_json: Option<String>,
    ) -> Result<ProvisionOutcome, ControlError> {
        let mut payload = serde_json::Map::new();
        payload.insert(
            "databaseName".to_string(),
            Value::String(database_name.to_string()),
        );
        if let Some(schema) = schema_json {
            payload.insert("schemaJson".to_string(), Value::String(schema));
        }
        if let Some(seed) = seed_json {
            payload.insert("seedJson".to_string(), Value::String(seed));
        }

        let command = AgentCommand {
            job_id: job_id.to_string(),
            app_id: app_id.to_string(),
            command_type: "ProvisionDatabase".to_string(),
            payload: Value::Object(payload),
            correlation_id: correlation_id.to_string(),
        };

        let response = self.post_command(&command).await?;
        let mongo = response.update.and_then(|u| u.mongo);

        Ok(ProvisionOutcome {
            success: response.success,
            error: response.error_message,
            database_name: mongo.as_ref().map(|m| m.database_name.clone()),
            connection_secret_ref: mongo.map(|m| m.connection_string_secret_ref),
        })
    }

    async fn send_command(&self, command: AgentCommand) -> Result<AgentResponse, ControlError> {
        self.post_command(&command).await
    }
}
