//! Git hosting integration
//!
//! Builds and mutates a remote repository's content-addressed object graph
//! (blobs, trees, commits, refs) through a hosting REST API: manifest
//! construction for diffing, incremental patch commits with pull requests,
//! bulk pushes for fresh deployments, and sealed-box repository secrets.

pub mod api;
pub mod graph;
pub mod secrets;
