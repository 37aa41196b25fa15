//! Mozaiks Deployment Control Core
//!
//! Orchestrates the path from a generated application bundle to a running,
//! git-hosted, database-backed deployment: durable deployment jobs, dedicated
//! database provisioning, git object-graph construction against a hosting
//! REST API, and a circuit-broken administrative proxy.

pub mod archive;
pub mod deploy;
pub mod errors;
pub mod githost;
pub mod logs;
pub mod models;
pub mod provision;
pub mod proxy;
pub mod schema;
pub mod settings;
pub mod staging;
pub mod store;
pub mod utils;
pub mod workers;
