//! Deployment worker
//!
//! Polls the job store for queued jobs and processes each through the
//! orchestrator. Job failures are captured on the job itself; this loop
//! never exits on them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::deploy::Orchestrator;
use crate::models::job::JobStatus;
use crate::store::JobStore;

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Jobs picked up per poll
    pub batch_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_size: 4,
        }
    }
}

/// Run the deployer worker
pub async fn run<S, F>(
    options: &Options,
    orchestrator: Arc<Orchestrator>,
    jobs: Arc<dyn JobStore>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Deployer worker starting...");

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with poll
            }
        }

        debug!("Checking for queued deployment jobs...");

        // Keep the shutdown future polled while a batch is in flight so a
        // stop request is not held up behind a slow or stuck deployment.
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down mid-batch...");
                return;
            }
            _ = process_batch(&orchestrator, &jobs, options.batch_size) => {}
        }
    }
}

async fn process_batch(
    orchestrator: &Orchestrator,
    jobs: &Arc<dyn JobStore>,
    batch_size: usize,
) {
    let queued = match jobs.next_queued(batch_size).await {
        Ok(queued) => queued,
        Err(e) => {
            error!("Failed to poll for queued jobs: {}", e);
            return;
        }
    };

    for job in queued {
        info!("Picked up deployment job {} for app {}", job.id, job.app_id);
        match orchestrator.process(&job.id).await {
            Ok(processed) if processed.status == JobStatus::Completed => {
                info!("Job {} completed", processed.id);
            }
            Ok(processed) => {
                info!(
                    "Job {} finished with status {:?}: {}",
                    processed.id,
                    processed.status,
                    processed.error_message.as_deref().unwrap_or("-")
                );
            }
            Err(e) => {
                error!("Processing job {} failed: {}", job.id, e);
            }
        }
    }
}
