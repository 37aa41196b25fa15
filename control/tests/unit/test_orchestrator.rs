use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;

use mozaiks_control::deploy::{EnqueueRequest, Orchestrator, OrchestratorOptions};
use mozaiks_control::githost::graph::GitGraphBuilder;
use mozaiks_control::models::app::{AppRecord, AppStatus};
use mozaiks_control::models::job::{BundleSource, DeploymentJob, JobStatus};
use mozaiks_control::provision::ProvisioningEngine;
use mozaiks_control::staging::StagingArea;
use mozaiks_control::store::memory::{
    MemoryAppDirectory, MemoryConnectionStore, MemoryJobStore,
};
use mozaiks_control::store::{AppDirectory, JobStore};
use mozaiks_control::utils::generate_uuid;

use crate::support::{FakeAdmin, FakeAgent, FakeGitHost};

const USERS_SCHEMA: &str = r#"{
    "tables": [{
        "name": "users",
        "columns": [
            { "name": "id", "type": "UUID", "constraints": ["PK"] },
            { "name": "email", "type": "String", "constraints": ["Not Null"] }
        ],
        "uniqueFields": ["email"]
    }]
}"#;

struct Fixture {
    orchestrator: Orchestrator,
    jobs: Arc<MemoryJobStore>,
    apps: Arc<MemoryAppDirectory>,
    agent: Arc<FakeAgent>,
    githost: Arc<FakeGitHost>,
    staging_dir: PathBuf,
}

fn fixture(githost: FakeGitHost) -> Fixture {
    let jobs = Arc::new(MemoryJobStore::new());
    let apps = Arc::new(MemoryAppDirectory::new());
    apps.put(AppRecord {
        id: "app-1".to_string(),
        name: "Demo App".to_string(),
        status: AppStatus::Created,
        api_key_digest: None,
        github_repo: None,
        deployed_at: None,
        database_provisioned_at: None,
        admin: None,
    });

    let staging_dir = std::env::temp_dir().join(format!("mozaiks-staging-{}", generate_uuid()));
    let staging = Arc::new(StagingArea::new(&staging_dir, 10 * 1024 * 1024).unwrap());

    let agent = Arc::new(FakeAgent::default());
    let admin = Arc::new(FakeAdmin::default());
    let connections = Arc::new(MemoryConnectionStore::new());
    let engine = Arc::new(ProvisioningEngine::new(
        agent.clone(),
        admin,
        connections.clone(),
    ));

    let githost = Arc::new(githost);
    let git = Arc::new(GitGraphBuilder::new(githost.clone(), "mozaiks-apps", true));

    let orchestrator = Orchestrator::new(
        jobs.clone(),
        apps.clone(),
        staging,
        engine,
        git,
        OrchestratorOptions {
            platform_api_url: "https://platform.example/api/v1".to_string(),
            core_bundle_url: None,
            core_cache_ttl: Duration::from_secs(600),
            default_commit_message: "Initial deployment".to_string(),
        },
    );

    Fixture {
        orchestrator,
        jobs,
        apps,
        agent,
        githost,
        staging_dir,
    }
}

fn bundle_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

fn inline_bundle(files: &[(&str, &[u8])]) -> BundleSource {
    BundleSource::Inline(STANDARD.encode(bundle_zip(files)))
}

fn request(source: BundleSource) -> EnqueueRequest {
    EnqueueRequest {
        app_id: "app-1".to_string(),
        user_id: "user-1".to_string(),
        repo_name: "demo-app".to_string(),
        branch: None,
        commit_message: None,
        source,
    }
}

fn pushed_file(githost: &FakeGitHost, path: &str) -> Option<Vec<u8>> {
    let state = githost.state.lock().unwrap();
    for entries in state.trees.values() {
        if let Some(entry) = entries.iter().find(|e| e.path == path) {
            let sha = entry.sha.as_ref()?;
            return state.blobs.get(sha).cloned();
        }
    }
    None
}

#[tokio::test]
async fn test_end_to_end_deployment() {
    let f = fixture(FakeGitHost::default());
    let source = inline_bundle(&[
        ("schema.json", USERS_SCHEMA.as_bytes()),
        ("app.config", b"B"),
        ("index.html", b"<html/>"),
    ]);

    let job = f.orchestrator.enqueue(request(source)).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    let staged = job.staging_path.clone().unwrap();
    assert!(staged.exists());

    let done = f.orchestrator.process(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.repo_full_name.as_deref(), Some("mozaiks-apps/demo-app"));
    assert!(done.completed_at.is_some());

    // The database was provisioned through the agent, schema included
    assert_eq!(*f.agent.provision_calls.lock().unwrap(), 1);
    let schema_json = f.agent.last_schema_json.lock().unwrap().clone().unwrap();
    assert!(schema_json.contains("\"users\""));

    // The job's correlation id rode both the agent and git-host calls
    let correlation = f.agent.last_correlation.lock().unwrap().clone().unwrap();
    assert_eq!(correlation, job.correlation_id);
    assert!(f
        .githost
        .state
        .lock()
        .unwrap()
        .correlations
        .contains(&job.correlation_id));

    // Bundle files and the generated runtime config landed in one commit
    assert_eq!(pushed_file(&f.githost, "app.config").unwrap(), b"B");
    assert!(pushed_file(&f.githost, "index.html").is_some());
    let runtime = pushed_file(&f.githost, "mozaiks.runtime.json").unwrap();
    let config: serde_json::Value = serde_json::from_slice(&runtime).unwrap();
    assert_eq!(config["platformApiUrl"], "https://platform.example/api/v1");
    assert_eq!(config["database"]["databaseName"], "appdb_app_1");
    let gitignore = pushed_file(&f.githost, ".gitignore").unwrap();
    assert!(String::from_utf8(gitignore)
        .unwrap()
        .lines()
        .any(|l| l == "mozaiks.runtime.json"));
    assert_eq!(f.githost.state.lock().unwrap().commit_log.len(), 1);

    // App record flipped to running with its deployment markers
    let app = f.apps.get("app-1").await.unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(app.github_repo.as_deref(), Some("mozaiks-apps/demo-app"));
    assert!(app.api_key_digest.is_some());
    assert!(app.database_provisioned_at.is_some());

    // Credentials handed to the repository as secrets
    let secret_names: Vec<String> = f
        .githost
        .state
        .lock()
        .unwrap()
        .secrets
        .iter()
        .map(|(name, _)| name.clone())
        .collect();
    assert!(secret_names.contains(&"MOZAIKS_API_KEY".to_string()));
    assert!(secret_names.contains(&"MOZAIKS_DB_CONNECTION_REF".to_string()));

    // Staged bundle cleaned up after success
    assert!(!staged.exists());
}

#[tokio::test]
async fn test_redeploy_reuses_provisioned_database() {
    let f = fixture(FakeGitHost::default());

    let first = f
        .orchestrator
        .enqueue(request(inline_bundle(&[
            ("schema.json", USERS_SCHEMA.as_bytes()),
            ("index.html", b"v1"),
        ])))
        .await
        .unwrap();
    f.orchestrator.process(&first.id).await.unwrap();
    let provisioned_at = f
        .apps
        .get("app-1")
        .await
        .unwrap()
        .unwrap()
        .database_provisioned_at;

    let second = f
        .orchestrator
        .enqueue(request(inline_bundle(&[
            ("schema.json", USERS_SCHEMA.as_bytes()),
            ("index.html", b"v2"),
        ])))
        .await
        .unwrap();
    let done = f.orchestrator.process(&second.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    // Existing connection record short-circuits the second provisioning
    assert_eq!(*f.agent.provision_calls.lock().unwrap(), 1);
    let app = f.apps.get("app-1").await.unwrap().unwrap();
    assert_eq!(app.database_provisioned_at, provisioned_at);

    // The second push stacks on the first commit
    let state = f.githost.state.lock().unwrap();
    assert_eq!(state.commit_log.len(), 2);
    let (_, _, _, parents) = &state.commit_log[1];
    assert_eq!(parents.len(), 1);
}

#[tokio::test]
async fn test_terminal_job_is_a_noop() {
    let f = fixture(FakeGitHost::default());
    let job = DeploymentJob {
        id: "job-done".to_string(),
        app_id: "app-1".to_string(),
        user_id: "user-1".to_string(),
        repo_name: "demo-app".to_string(),
        branch: "main".to_string(),
        commit_message: "m".to_string(),
        bundle_source: BundleSource::Inline(String::new()),
        staging_path: None,
        status: JobStatus::Completed,
        repo_url: None,
        repo_full_name: None,
        correlation_id: "corr-1".to_string(),
        created_at: Utc::now(),
        started_at: None,
        completed_at: Some(Utc::now()),
        error_message: None,
    };
    f.jobs.insert(job.clone()).await.unwrap();

    let processed = f.orchestrator.process("job-done").await.unwrap();
    assert_eq!(processed.status, JobStatus::Completed);
    assert_eq!(processed.completed_at, job.completed_at);

    // No remote traffic and no store mutation
    assert_eq!(*f.agent.provision_calls.lock().unwrap(), 0);
    assert_eq!(f.githost.state.lock().unwrap().remote_calls, 0);
    let app = f.apps.get("app-1").await.unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Created);
}

#[tokio::test]
async fn test_push_failure_marks_job_and_app_failed() {
    let f = fixture(FakeGitHost {
        fail_create_repo: true,
        ..FakeGitHost::default()
    });
    let source = inline_bundle(&[("index.html", b"<html/>")]);

    let job = f.orchestrator.enqueue(request(source)).await.unwrap();
    let staged = job.staging_path.clone().unwrap();

    let done = f.orchestrator.process(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done
        .error_message
        .as_deref()
        .unwrap()
        .contains("repository service unavailable"));

    let app = f.apps.get("app-1").await.unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Failed);

    // Staged bundle is kept for retry
    assert!(staged.exists());
}

#[tokio::test]
async fn test_missing_job_is_an_error() {
    let f = fixture(FakeGitHost::default());
    assert!(f.orchestrator.process("no-such-job").await.is_err());
}

#[tokio::test]
async fn test_bundle_without_schema_skips_provisioning() {
    let f = fixture(FakeGitHost::default());
    let source = inline_bundle(&[("index.html", b"<html/>")]);

    let job = f.orchestrator.enqueue(request(source)).await.unwrap();
    let done = f.orchestrator.process(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    assert_eq!(*f.agent.provision_calls.lock().unwrap(), 0);
    let runtime = pushed_file(&f.githost, "mozaiks.runtime.json").unwrap();
    let config: serde_json::Value = serde_json::from_slice(&runtime).unwrap();
    assert!(config.get("database").is_none());
    assert!(f.staging_dir.exists());
}
