//! src/services/directory.rs
//!
//! Directory semantics over a flat object namespace. A directory is a name
//! prefix ending in `/`; a zero-byte marker object at that exact name makes
//! an otherwise empty directory visible in listings.

use crate::{
    models::object::DIRECTORY_CONTENT_TYPE,
    services::storage_gateway::{GatewayError, StorageGateway},
};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("directory `{0}` not found or is already empty")]
    NotFoundOrEmpty(String),
    #[error(transparent)]
    Gateway(GatewayError),
}

impl From<GatewayError> for DirectoryError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::BucketNotFound(bucket) => DirectoryError::BucketNotFound(bucket),
            other => DirectoryError::Gateway(other),
        }
    }
}

/// Collapse trailing separators into exactly one.
pub fn normalize_directory_name(name: &str) -> String {
    format!("{}/", name.trim_end_matches('/'))
}

#[derive(Clone)]
pub struct DirectoryEmulator {
    gateway: Arc<dyn StorageGateway>,
}

impl DirectoryEmulator {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    /// Write the marker for `name`. Re-creating an existing directory just
    /// overwrites its marker. Returns the normalized name.
    pub async fn create_directory(&self, bucket: &str, name: &str) -> Result<String, DirectoryError> {
        let directory = normalize_directory_name(name);
        self.gateway
            .put_object(bucket, &directory, Bytes::new(), DIRECTORY_CONTENT_TYPE)
            .await?;
        info!(bucket, directory = %directory, "created directory marker");
        Ok(directory)
    }

    /// Delete every object under the normalized prefix, marker included.
    ///
    /// Deletes run one by one and stop at the first failure; objects already
    /// removed stay removed. Returns the normalized name and the number of
    /// objects deleted.
    pub async fn delete_directory(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<(String, usize), DirectoryError> {
        let directory = normalize_directory_name(name);
        let objects = self.gateway.list_objects(bucket, Some(&directory)).await?;
        if objects.is_empty() {
            return Err(DirectoryError::NotFoundOrEmpty(directory));
        }

        let total = objects.len();
        for (deleted, object) in objects.iter().enumerate() {
            if let Err(err) = self.gateway.delete_object(bucket, &object.name).await {
                warn!(
                    bucket,
                    directory = %directory,
                    object = %object.name,
                    deleted,
                    total,
                    error = %err,
                    "directory delete stopped part way"
                );
                return Err(err.into());
            }
        }
        info!(bucket, directory = %directory, deleted = total, "deleted directory");
        Ok((directory, total))
    }
}
