use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use mozaiks_control::deploy::{EnqueueRequest, Orchestrator, OrchestratorOptions};
use mozaiks_control::githost::graph::GitGraphBuilder;
use mozaiks_control::models::app::{AppRecord, AppStatus};
use mozaiks_control::models::job::{BundleSource, JobStatus};
use mozaiks_control::provision::ProvisioningEngine;
use mozaiks_control::staging::StagingArea;
use mozaiks_control::store::memory::{
    MemoryAppDirectory, MemoryConnectionStore, MemoryJobStore,
};
use mozaiks_control::store::JobStore;
use mozaiks_control::utils::generate_uuid;
use mozaiks_control::workers::deployer;

use crate::support::{FakeAdmin, FakeAgent, FakeGitHost};

struct Fixture {
    orchestrator: Arc<Orchestrator>,
    jobs: Arc<MemoryJobStore>,
    githost: Arc<FakeGitHost>,
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

    let engine = Arc::new(ProvisioningEngine::new(
        Arc::new(FakeAgent::default()),
        Arc::new(FakeAdmin::default()),
        Arc::new(MemoryConnectionStore::new()),
    ));

    let githost = Arc::new(githost);
    let git = Arc::new(GitGraphBuilder::new(githost.clone(), "mozaiks-apps", true));

    let orchestrator = Arc::new(Orchestrator::new(
        jobs.clone(),
        apps,
        staging,
        engine,
        git,
        OrchestratorOptions::default(),
    ));

    Fixture {
        orchestrator,
        jobs,
        githost,
    }
}

fn inline_bundle() -> BundleSource {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("index.html", options).unwrap();
        writer.write_all(b"<html/>").unwrap();
        writer.finish().unwrap();
    }
    BundleSource::Inline(STANDARD.encode(buffer.into_inner()))
}

fn request() -> EnqueueRequest {
    EnqueueRequest {
        app_id: "app-1".to_string(),
        user_id: "user-1".to_string(),
        repo_name: "demo-app".to_string(),
        branch: None,
        commit_message: None,
        source: inline_bundle(),
    }
}

#[tokio::test]
async fn test_shutdown_before_poll_exits_without_processing() {
    let f = fixture(FakeGitHost::default());
    f.orchestrator.enqueue(request()).await.unwrap();

    deployer::run(
        &deployer::Options::default(),
        f.orchestrator.clone(),
        f.jobs.clone(),
        tokio::time::sleep,
        Box::pin(async {}),
    )
    .await;

    // The already-resolved shutdown won the first select
    assert_eq!(f.githost.state.lock().unwrap().remote_calls, 0);
    let queued = f.jobs.next_queued(10).await.unwrap();
    assert_eq!(queued.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_inflight_batch() {
    let f = fixture(FakeGitHost {
        stall_get_repo: true,
        ..FakeGitHost::default()
    });
    let job = f.orchestrator.enqueue(request()).await.unwrap();

    let options = deployer::Options {
        interval: Duration::from_millis(10),
        batch_size: 4,
    };
    let shutdown = Box::pin(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
    });

    // The push hangs for an hour inside the fake; the worker must still
    // return when the shutdown timer fires
    deployer::run(
        &options,
        f.orchestrator.clone(),
        f.jobs.clone(),
        tokio::time::sleep,
        shutdown,
    )
    .await;

    let stored = f.jobs.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    assert!(f.githost.state.lock().unwrap().commit_log.is_empty());
}
