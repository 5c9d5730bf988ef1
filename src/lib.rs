//! HTTP facade over cloud object storage.
//!
//! Buckets, files, and emulated directories are exposed as JSON endpoints
//! and delegated to a [`services::storage_gateway::StorageGateway`]. File
//! downloads are handed out as time-limited signed URLs.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
