//! Deployment orchestration

pub mod orchestrator;

pub use orchestrator::{EnqueueRequest, Orchestrator, OrchestratorOptions};
