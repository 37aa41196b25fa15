//! Mozaiks deployment control worker entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::SecretString;
use tracing::info;

use mozaiks_control::deploy::{Orchestrator, OrchestratorOptions};
use mozaiks_control::githost::api::GitHostClient;
use mozaiks_control::githost::graph::GitGraphBuilder;
use mozaiks_control::logs::{init_logging, LogOptions};
use mozaiks_control::provision::admin::AgentDatabaseAdmin;
use mozaiks_control::provision::agent::HttpProvisioningAgent;
use mozaiks_control::provision::ProvisioningEngine;
use mozaiks_control::settings::Settings;
use mozaiks_control::staging::StagingArea;
use mozaiks_control::store::file::{FileConnectionStore, FileJobStore};
use mozaiks_control::store::memory::MemoryAppDirectory;
use mozaiks_control::store::{ConnectionStore, JobStore};
use mozaiks_control::workers::deployer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_path = std::env::var("MOZAIKS_CONTROL_SETTINGS")
        .unwrap_or_else(|_| "/etc/mozaiks/control.json".to_string());
    let settings = Settings::load_or_default(&settings_path)
        .await
        .with_context(|| format!("loading settings from {}", settings_path))?;

    init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        json_format: false,
    })?;
    info!("Mozaiks control worker starting");

    // Durable collections live under the metadata-database namespace so
    // queued jobs and connection records survive a restart
    let data_dir = settings
        .data_dir
        .join(&settings.provisioning.metadata_database);
    let jobs: Arc<dyn JobStore> = Arc::new(
        FileJobStore::open(data_dir.join("deployment_jobs.json"))
            .await
            .context("opening deployment job store")?,
    );
    let connections: Arc<dyn ConnectionStore> = Arc::new(
        FileConnectionStore::open(data_dir.join("connection_strings.json"))
            .await
            .context("opening connection string store")?,
    );
    // Application records are owned by the platform; this worker keeps an
    // in-process directory until that surface is wired in
    let apps = Arc::new(MemoryAppDirectory::new());

    let staging = Arc::new(StagingArea::new(
        settings.staging.dir.clone(),
        settings.staging.max_bundle_bytes,
    )?);

    let agent = Arc::new(HttpProvisioningAgent::new(
        &settings.provisioning.base_url,
        SecretString::from(settings.provisioning.api_key.clone()),
        Duration::from_secs(settings.provisioning.timeout_secs),
    )?);
    let admin = Arc::new(AgentDatabaseAdmin::new(
        agent.clone(),
        settings.provisioning.admin_connection_override.clone(),
    ));
    let engine = Arc::new(ProvisioningEngine::new(agent, admin, connections));

    let githost = Arc::new(GitHostClient::new(
        &settings.githost.base_url,
        SecretString::from(settings.githost.token.clone()),
        Duration::from_secs(settings.githost.timeout_secs),
    )?);
    let git = Arc::new(GitGraphBuilder::new(
        githost,
        &settings.githost.owner,
        settings.githost.private_repos,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        jobs.clone(),
        apps,
        staging,
        engine,
        git,
        OrchestratorOptions {
            platform_api_url: settings.platform_api_url.clone(),
            core_bundle_url: settings.staging.core_bundle_url.clone(),
            core_cache_ttl: Duration::from_secs(settings.staging.core_cache_ttl_secs),
            ..OrchestratorOptions::default()
        },
    ));

    let shutdown = Box::pin(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    deployer::run(
        &deployer::Options::default(),
        orchestrator,
        jobs,
        tokio::time::sleep,
        shutdown,
    )
    .await;

    info!("Mozaiks control worker stopped");
    Ok(())
}
