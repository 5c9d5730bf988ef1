//! Core data models for the storage facade.
//!
//! These mirror the provider's bucket and object resources, trimmed to the
//! fields the HTTP surface exposes. They serialize naturally as JSON via
//! `serde`.

pub mod bucket;
pub mod object;
pub mod signed_url;
