//! Deployment orchestrator
//!
//! The top-level state machine: `Queued -> Running -> Completed | Failed`.
//! Sequences archive merging, database provisioning, runtime-config
//! injection, and the bulk git push, with failure capture that never
//! escapes the worker loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::archive::{self, FileMap};
use crate::errors::ControlError;
use crate::githost::graph::GitGraphBuilder;
use crate::models::app::{AppRecord, AppStatus};
use crate::models::job::{BundleSource, DeploymentJob, JobStatus};
use crate::models::schema::{SchemaDefinition, SeedData};
use crate::provision::ProvisioningEngine;
use crate::staging::StagingArea;
use crate::store::{AppDirectory, JobStore};
use crate::utils::{generate_api_key, generate_correlation_id, generate_uuid, sha256_hex};

/// File injected into every deployment with the app's runtime credentials
const RUNTIME_CONFIG_PATH: &str = "mozaiks.runtime.json";

/// Schema and seed files recognized inside a bundle
const SCHEMA_FILE: &str = "schema.json";
const SEED_FILE: &str = "seed.json";

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Platform API base URL injected into generated runtime config
    pub platform_api_url: String,

    /// Optional URL of the base runtime file set merged under every bundle
    pub core_bundle_url: Option<String>,

    /// TTL for the cached base runtime file set
    pub core_cache_ttl: Duration,

    /// Default commit message when the enqueue request has none
    pub default_commit_message: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            platform_api_url: "http://localhost:8080/api/v1".to_string(),
            core_bundle_url: None,
            core_cache_ttl: Duration::from_secs(600),
            default_commit_message: "Initial deployment".to_string(),
        }
    }
}

/// Request to enqueue a deployment
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub app_id: String,
    pub user_id: String,
    pub repo_name: String,
    pub branch: Option<String>,
    pub commit_message: Option<String>,
    pub source: BundleSource,
}

struct CachedCore {
    files: FileMap,
    fetched_at: DateTime<Utc>,
}

/// Deployment orchestrator with injected collaborators
pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    apps: Arc<dyn AppDirectory>,
    staging: Arc<StagingArea>,
    engine: Arc<ProvisioningEngine>,
    git: Arc<GitGraphBuilder>,
    options: OrchestratorOptions,
    core_cache: tokio::sync::RwLock<Option<CachedCore>>,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        apps: Arc<dyn AppDirectory>,
        staging: Arc<StagingArea>,
        engine: Arc<ProvisioningEngine>,
        git: Arc<GitGraphBuilder>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            jobs,
            apps,
            staging,
            engine,
            git,
            options,
            core_cache: tokio::sync::RwLock::new(None),
        }
    }

    /// Fetch the bundle into durable staging and write a queued job.
    /// Reprocessing never re-fetches.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<DeploymentJob, ControlError> {
        let job_id = generate_uuid();
        let bytes = self.staging.fetch(&request.source).await?;
        let staged = self.staging.save(&job_id, &bytes).await?;

        let job = DeploymentJob {
            id: job_id,
            app_id: request.app_id,
            user_id: request.user_id,
            repo_name: request.repo_name,
            branch: request.branch.unwrap_or_else(|| "main".to_string()),
            commit_message: request
                .commit_message
                .unwrap_or_else(|| self.options.default_commit_message.clone()),
            bundle_source: request.source,
            staging_path: Some(staged),
            status: JobStatus::Queued,
            repo_url: None,
            repo_full_name: None,
            correlation_id: generate_correlation_id(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        };

        self.jobs.insert(job.clone()).await?;
        info!("Enqueued deployment job {} for app {}", job.id, job.app_id);
        Ok(job)
    }

    /// Process one job. A job already in a terminal state is a no-op.
    /// Failures are captured on the job, never raised past this boundary.
    pub async fn process(&self, job_id: &str) -> Result<DeploymentJob, ControlError> {
        let Some(mut job) = self.jobs.get(job_id).await? else {
            return Err(ControlError::NotFound(format!("job {}", job_id)));
        };

        if job.status.is_terminal() {
            debug!("Job {} already {:?}, skipping", job.id, job.status);
            return Ok(job);
        }

        if job.status == JobStatus::Queued {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            self.jobs.update(&job).await?;
        }

        match self.run(&mut job).await {
            Ok(()) => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
                job.error_message = None;
                self.jobs.update(&job).await?;
                info!("Job {} completed ({})", job.id, job.repo_full_name.as_deref().unwrap_or("-"));

                if let Some(path) = job.staging_path.clone() {
                    if let Err(e) = self.staging.remove(&path).await {
                        warn!("Could not remove staged bundle for job {}: {}", job.id, e);
                    }
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", job.id, e);
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error_message = Some(e.to_string());
                self.jobs.update(&job).await?;

                // Best effort; the staged bundle is kept for retry
                if let Err(flip) = self.mark_app_failed(&job.app_id).await {
                    warn!("Could not mark app {} failed: {}", job.app_id, flip);
                }
            }
        }

        Ok(job)
    }

    async fn run(&self, job: &mut DeploymentJob) -> Result<(), ControlError> {
        let staged = job
            .staging_path
            .clone()
            .ok_or_else(|| ControlError::InvalidRequest("job has no staged bundle".to_string()))?;
        let bytes = self.staging.load(&staged).await?;
        // Uncompressed cap: 10x the transfer cap guards against zip bombs
        let unpack_limit = self.staging.max_bundle_bytes().saturating_mul(10);
        let bundle = archive::extract_zip(&bytes, unpack_limit)?;

        let mut app = self
            .apps
            .get(&job.app_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("app {}", job.app_id)))?;

        let base = self.core_files().await?;
        let mut merged = match base {
            Some(core) => archive::merge(&core, &bundle),
            None => bundle.clone(),
        };

        let schema = read_bundle_json::<SchemaDefinition>(&bundle, SCHEMA_FILE)?;
        let seed = read_bundle_json::<SeedData>(&bundle, SEED_FILE)?;

        // Every remote call this run makes carries the job's correlation id
        let git = self.git.with_correlation(&job.correlation_id);

        let mut database: Option<(String, String)> = None;
        if let Some(schema) = &schema {
            let result = self
                .engine
                .provision(
                    &job.id,
                    &job.correlation_id,
                    &job.app_id,
                    &app.name,
                    Some(schema),
                    seed.as_ref(),
                )
                .await;
            if !result.success {
                return Err(ControlError::Internal(format!(
                    "database provisioning failed: {}",
                    result.error.unwrap_or_default()
                )));
            }
            database = result.database_name.zip(result.connection_ref);

            // Keep the first provisioning timestamp
            if app.database_provisioned_at.is_none() {
                app.database_provisioned_at = Some(Utc::now());
            }
        }

        let api_key = generate_api_key();
        app.api_key_digest = Some(sha256_hex(&api_key));
        inject_runtime_config(
            &mut merged,
            &api_key,
            &self.options.platform_api_url,
            database.as_ref(),
        );

        let push = git.bulk_push(&job.repo_name, &merged, &job.commit_message).await?;

        job.repo_url = Some(push.repo_url);
        job.repo_full_name = Some(push.repo_full_name.clone());

        app.status = AppStatus::Running;
        app.github_repo = Some(push.repo_full_name);
        app.deployed_at = Some(Utc::now());
        self.apps.update(&app).await?;

        // Secret hand-off is best effort; the deployment itself stands
        let mut secrets: Vec<(String, SecretString)> =
            vec![("MOZAIKS_API_KEY".to_string(), SecretString::from(api_key))];
        if let Some((_, connection_ref)) = &database {
            secrets.push((
                "MOZAIKS_DB_CONNECTION_REF".to_string(),
                SecretString::from(connection_ref.clone()),
            ));
        }
        match git.configure_repo_secrets(&job.repo_name, &secrets).await {
            Ok(report) if !report.is_success() => {
                warn!(
                    "Job {}: secrets not written: {}",
                    job.id,
                    report.failed.join(", ")
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Job {}: secret configuration failed: {}", job.id, e),
        }

        Ok(())
    }

    async fn mark_app_failed(&self, app_id: &str) -> Result<(), ControlError> {
        if let Some(mut app) = self.apps.get(app_id).await? {
            app.status = AppStatus::Failed;
            self.apps.update(&app).await?;
        }
        Ok(())
    }

    /// Base runtime file set, fetched once and cached with a TTL
    async fn core_files(&self) -> Result<Option<FileMap>, ControlError> {
        let Some(url) = &self.options.core_bundle_url else {
            return Ok(None);
        };

        {
            let cache = self.core_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let age = Utc::now() - cached.fetched_at;
                if age.to_std().unwrap_or_default() < self.options.core_cache_ttl {
                    return Ok(Some(cached.files.clone()));
                }
            }
        }

        debug!("Fetching base runtime file set from {}", url);
        let bytes = self.staging.fetch(&BundleSource::Url(url.clone())).await?;
        let files = archive::extract_zip(&bytes, self.staging.max_bundle_bytes().saturating_mul(10))?;

        let mut cache = self.core_cache.write().await;
        *cache = Some(CachedCore {
            files: files.clone(),
            fetched_at: Utc::now(),
        });
        Ok(Some(files))
    }
}

/// Find a bundle file by base name, case-insensitively, and parse it
fn read_bundle_json<T: serde::de::DeserializeOwned>(
    bundle: &FileMap,
    file_name: &str,
) -> Result<Option<T>, ControlError> {
    let found = bundle.iter().find(|(path, _)| {
        path.rsplit('/')
            .next()
            .map(|base| base.eq_ignore_ascii_case(file_name))
            .unwrap_or(false)
    });
    match found {
        Some((path, bytes)) => {
            let parsed = serde_json::from_slice(bytes).map_err(|e| {
                ControlError::InvalidRequest(format!("{}: {}", path, e))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Inject the generated runtime configuration and a `.gitignore` entry
/// protecting it into the merged file set
fn inject_runtime_config(
    files: &mut FileMap,
    api_key: &str,
    platform_api_url: &str,
    database: Option<&(String, String)>,
) {
    let mut config = json!({
        "apiKey": api_key,
        "platformApiUrl": platform_api_url,
    });
    if let Some((database_name, connection_ref)) = database {
        config["database"] = json!({
            "databaseName": database_name,
            "connectionRef": connection_ref,
        });
    }

    let rendered = serde_json::to_vec_pretty(&config).unwrap_or_default();
    files.insert(RUNTIME_CONFIG_PATH.to_string(), rendered);

    let gitignore_key = files
        .keys()
        .find(|path| path.eq_ignore_ascii_case(".gitignore"))
        .cloned()
        .unwrap_or_else(|| ".gitignore".to_string());
    let mut gitignore = files
        .get(&gitignore_key)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default();
    if !gitignore.lines().any(|line| line.trim() == RUNTIME_CONFIG_PATH) {
        if !gitignore.is_empty() && !gitignore.ends_with('\n') {
            gitignore.push('\n');
        }
        gitignore.push_str(RUNTIME_CONFIG_PATH);
        gitignore.push('\n');
    }
    files.insert(gitignore_key, gitignore.into_bytes());
}
