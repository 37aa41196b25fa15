//! Database provisioning engine
//!
//! Orchestrates dedicated-database creation via the remote provisioning
//! agent, idempotent schema application and seeding, and connection-record
//! bookkeeping.

pub mod admin;
pub mod agent;
pub mod seed;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::ControlError;
use crate::models::connection::{ConnectionRecord, ConnectionStatus};
use crate::models::schema::{SchemaDefinition, SeedData};
use crate::provision::admin::DatabaseAdmin;
use crate::provision::agent::ProvisioningAgent;
use crate::store::ConnectionStore;

/// Database names are lowercased, restricted to `[a-z0-9_]`, and capped
const MAX_DATABASE_NAME_LEN: usize = 38;

/// Structured result of a provisioning attempt; remote failures are
/// reported here, not raised
#[derive(Debug, Clone)]
pub struct ProvisionResult {
    pub success: bool,
    pub database_name: Option<String>,
    pub connection_ref: Option<String>,
    pub error: Option<String>,
}

impl ProvisionResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            database_name: None,
            connection_ref: None,
            error: Some(error.into()),
        }
    }
}

/// Totals from a seeding run
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Provisioning engine with injected collaborators
pub struct ProvisioningEngine {
    agent: Arc<dyn ProvisioningAgent>,
    admin: Arc<dyn DatabaseAdmin>,
    connections: Arc<dyn ConnectionStore>,
}

impl ProvisioningEngine {
    pub fn new(
        agent: Arc<dyn ProvisioningAgent>,
        admin: Arc<dyn DatabaseAdmin>,
        connections: Arc<dyn ConnectionStore>,
    ) -> Self {
        Self {
            agent,
            admin,
            connections,
        }
    }

    /// Provision a dedicated database for an application.
    ///
    /// Idempotent: an existing usable connection record short-circuits
    /// without a remote call.
    pub async fn provision(
        &self,
        job_id: &str,
        correlation_id: &str,
        app_id: &str,
        app_name: &str,
        schema: Option<&SchemaDefinition>,
        seed: Option<&SeedData>,
    ) -> ProvisionResult {
        match self.connections.get(app_id).await {
            Ok(Some(record)) if record.is_provisioned() => {
                debug!("App {} already provisioned ({})", app_id, record.database_name);
                return ProvisionResult {
                    success: true,
                    database_name: Some(record.database_name),
                    connection_ref: Some(record.connection_secret_ref),
                    error: None,
                };
            }
            Ok(_) => {}
            Err(e) => return ProvisionResult::failure(e.to_string()),
        }

        let candidate = sanitize_database_name(&format!("appdb_{}", app_id));
        info!(
            "Provisioning database {} for app {} ({})",
            candidate, app_id, app_name
        );

        let schema_json = match schema.map(serde_json::to_string).transpose() {
            Ok(json) => json,
            Err(e) => return ProvisionResult::failure(e.to_string()),
        };
        let seed_json = match seed.map(serde_json::to_string).transpose() {
            Ok(json) => json,
            Err(e) => return ProvisionResult::failure(e.to_string()),
        };

        let outcome = match self
            .agent
            .provision_database(job_id, correlation_id, app_id, &candidate, schema_json, seed_json)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Provisioning agent call failed for app {}: {}", app_id, e);
                return ProvisionResult::failure(e.to_string());
            }
        };

        if !outcome.success {
            return ProvisionResult::failure(
                outcome.error.unwrap_or_else(|| "provisioning failed".to_string()),
            );
        }

        let database_name = outcome.database_name.unwrap_or(candidate);
        let connection_ref = match outcome.connection_secret_ref {
            Some(secret_ref) => secret_ref,
            None => {
                return ProvisionResult::failure(
                    "provisioning agent returned no connection reference",
                )
            }
        };

        let now = Utc::now();
        let record = ConnectionRecord {
            app_id: app_id.to_string(),
            database_name,
            connection_secret_ref: connection_ref,
            status: ConnectionStatus::Active,
            created_at: now,
            updated_at: now,
        };

        // First write wins; adopt whichever record is stored
        let stored = match self.connections.insert_new(record).await {
            Ok(stored) => stored,
            Err(e) => return ProvisionResult::failure(e.to_string()),
        };

        ProvisionResult {
            success: true,
            database_name: Some(stored.database_name),
            connection_ref: Some(stored.connection_secret_ref),
            error: None,
        }
    }

    /// Apply a schema to an already provisioned database: create each
    /// collection with its validator (modify in place when it already
    /// exists), then synchronize indexes skip-if-exists.
    pub async fn apply_schema(
        &self,
        app_id: &str,
        schema: &SchemaDefinition,
    ) -> Result<(), ControlError> {
        let record = self.require_record(app_id).await?;

        for table in &schema.tables {
            let translated = crate::schema::translate(table);

            match self
                .admin
                .create_collection(app_id, &record.database_name, &table.name, &translated.validator)
                .await
            {
                Ok(()) => {}
                Err(ControlError::AlreadyExists(_)) => {
                    debug!("Collection {} exists, modifying validator", table.name);
                    self.admin
                        .modify_collection(
                            app_id,
                            &record.database_name,
                            &table.name,
                            &translated.validator,
                        )
                        .await?;
                }
                Err(e) => return Err(e),
            }

            let existing = self
                .admin
                .index_names(app_id, &record.database_name, &table.name)
                .await?;
            for spec in &translated.indexes {
                if existing.iter().any(|name| name == &spec.name) {
                    continue;
                }
                self.admin
                    .create_index(app_id, &record.database_name, &table.name, spec)
                    .await?;
            }
        }

        Ok(())
    }

    /// Seed the provisioned database. Duplicate keys are tolerated, any
    /// other per-document failure surfaces as `SeedFailed`.
    pub async fn seed(&self, app_id: &str, seed_data: &SeedData) -> Result<SeedReport, ControlError> {
        let record = self.require_record(app_id).await?;
        let mut report = SeedReport::default();

        for (collection, documents) in seed_data {
            if documents.is_empty() {
                continue;
            }

            let coerced: Vec<serde_json::Value> =
                documents.iter().map(seed::coerce_document).collect();

            let outcome = self
                .admin
                .bulk_insert(app_id, &record.database_name, collection, &coerced)
                .await?;

            if !outcome.errors.is_empty() {
                return Err(ControlError::SeedFailed(format!(
                    "collection {}: {}",
                    collection,
                    outcome.errors.join("; ")
                )));
            }

            if outcome.duplicates > 0 {
                debug!(
                    "Collection {}: {} documents already seeded",
                    collection, outcome.duplicates
                );
            }

            report.inserted += outcome.inserted;
            report.duplicates += outcome.duplicates;
        }

        Ok(report)
    }

    async fn require_record(&self, app_id: &str) -> Result<ConnectionRecord, ControlError> {
        match self.connections.get(app_id).await? {
            Some(record) if record.is_provisioned() => Ok(record),
            _ => Err(ControlError::NoDatabaseProvisioned(app_id.to_string())),
        }
    }
}

/// Sanitize a candidate database name: lowercase, non-alphanumerics to
/// underscores, repeats collapsed, trimmed, capped in length
pub fn sanitize_database_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;

    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }

    let trimmed = out.trim_matches('_');
    trimmed.chars().take(MAX_DATABASE_NAME_LEN).collect()
}
