//! Data models for the control core

pub mod app;
pub mod connection;
pub mod job;
pub mod schema;
