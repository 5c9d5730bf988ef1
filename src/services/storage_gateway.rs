//! src/services/storage_gateway.rs
//!
//! StorageGateway — the narrow seam between the HTTP facade and the backing
//! object store. Implementations hold no cache: every call reflects the
//! provider's state at call time, so callers must tolerate races such as a
//! listed object disappearing before it is fetched.

use crate::models::{bucket::Bucket, object::Object};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("object `{name}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, name: String },
    #[error("storage provider error: {0}")]
    Provider(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::BucketNotFound(_) | GatewayError::ObjectNotFound { .. }
        )
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Bucket and object primitives against a remote object store.
///
/// All mutating calls are remote and not transactional. Implementations must
/// be safe to share across request tasks.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Short backend label used in logs and readiness output.
    fn backend(&self) -> &'static str;

    async fn create_bucket(&self, name: &str, location: &str) -> GatewayResult<Bucket>;

    async fn get_bucket(&self, name: &str) -> GatewayResult<Bucket>;

    async fn list_buckets(&self) -> GatewayResult<Vec<Bucket>>;

    /// Delete a bucket. Without `force`, a bucket holding objects fails with
    /// `BucketNotEmpty`; with it, its objects are deleted first.
    async fn delete_bucket(&self, name: &str, force: bool) -> GatewayResult<()>;

    async fn get_object(&self, bucket: &str, name: &str) -> GatewayResult<Object>;

    /// List objects whose name starts with `prefix`, in name order.
    ///
    /// Only a missing bucket is an error; no match yields an empty list.
    async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> GatewayResult<Vec<Object>>;

    /// Store `data` under `name`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> GatewayResult<Object>;

    async fn delete_object(&self, bucket: &str, name: &str) -> GatewayResult<()>;

    /// Fetch an object's metadata together with its content.
    async fn read_object(&self, bucket: &str, name: &str) -> GatewayResult<(Object, Bytes)>;

    /// Existence check that folds NotFound into `false`.
    async fn object_exists(&self, bucket: &str, name: &str) -> GatewayResult<bool> {
        match self.get_object(bucket, name).await {
            Ok(_) => Ok(true),
            Err(GatewayError::ObjectNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
