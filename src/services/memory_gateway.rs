//! src/services/memory_gateway.rs
//!
//! MemoryGateway — an in-process object store with the same observable
//! semantics as the Cloud Storage gateway. Used for local development
//! (`--backend memory`) and in tests.

use crate::{
    models::{bucket::Bucket, object::Object},
    services::storage_gateway::{GatewayError, GatewayResult, StorageGateway},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

struct StoredObject {
    meta: Object,
    data: Bytes,
}

struct StoredBucket {
    meta: Bucket,
    objects: BTreeMap<String, StoredObject>,
}

/// Bucket map guarded by a synchronous lock. The lock is never held across
/// an `.await`.
#[derive(Default)]
pub struct MemoryGateway {
    buckets: RwLock<BTreeMap<String, StoredBucket>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

fn object_not_found(bucket: &str, name: &str) -> GatewayError {
    GatewayError::ObjectNotFound {
        bucket: bucket.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_bucket(&self, name: &str, location: &str) -> GatewayResult<Bucket> {
        let mut buckets = self.buckets.write();
        if buckets.contains_key(name) {
            return Err(GatewayError::BucketAlreadyExists(name.to_string()));
        }
        let meta = Bucket {
            id: name.to_string(),
            name: name.to_string(),
            location: location.to_uppercase(),
            time_created: Utc::now(),
        };
        buckets.insert(
            name.to_string(),
            StoredBucket {
                meta: meta.clone(),
                objects: BTreeMap::new(),
            },
        );
        debug!(bucket = name, "created in-memory bucket");
        Ok(meta)
    }

    async fn get_bucket(&self, name: &str) -> GatewayResult<Bucket> {
        self.buckets
            .read()
            .get(name)
            .map(|b| b.meta.clone())
            .ok_or_else(|| GatewayError::BucketNotFound(name.to_string()))
    }

    async fn list_buckets(&self) -> GatewayResult<Vec<Bucket>> {
        Ok(self.buckets.read().values().map(|b| b.meta.clone()).collect())
    }

    async fn delete_bucket(&self, name: &str, force: bool) -> GatewayResult<()> {
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .get(name)
            .ok_or_else(|| GatewayError::BucketNotFound(name.to_string()))?;
        if !force && !bucket.objects.is_empty() {
            return Err(GatewayError::BucketNotEmpty(name.to_string()));
        }
        buckets.remove(name);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, name: &str) -> GatewayResult<Object> {
        let buckets = self.buckets.read();
        let stored = buckets
            .get(bucket)
            .ok_or_else(|| GatewayError::BucketNotFound(bucket.to_string()))?;
        stored
            .objects
            .get(name)
            .map(|o| o.meta.clone())
            .ok_or_else(|| object_not_found(bucket, name))
    }

    async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> GatewayResult<Vec<Object>> {
        let buckets = self.buckets.read();
        let stored = buckets
            .get(bucket)
            .ok_or_else(|| GatewayError::BucketNotFound(bucket.to_string()))?;
        let prefix = prefix.unwrap_or("");
        Ok(stored
            .objects
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(_, o)| o.meta.clone())
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> GatewayResult<Object> {
        let mut buckets = self.buckets.write();
        let stored = buckets
            .get_mut(bucket)
            .ok_or_else(|| GatewayError::BucketNotFound(bucket.to_string()))?;
        let digest = md5::compute(&data);
        let meta = Object {
            bucket: bucket.to_string(),
            name: name.to_string(),
            size: data.len() as u64,
            content_type: Some(content_type.to_string()),
            updated: Utc::now(),
            md5_hash: Some(general_purpose::STANDARD.encode(digest.0)),
        };
        stored.objects.insert(
            name.to_string(),
            StoredObject {
                meta: meta.clone(),
                data,
            },
        );
        Ok(meta)
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> GatewayResult<()> {
        let mut buckets = self.buckets.write();
        let stored = buckets
            .get_mut(bucket)
            .ok_or_else(|| GatewayError::BucketNotFound(bucket.to_string()))?;
        stored
            .objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| object_not_found(bucket, name))
    }

    async fn read_object(&self, bucket: &str, name: &str) -> GatewayResult<(Object, Bytes)> {
        let buckets = self.buckets.read();
        let stored = buckets
            .get(bucket)
            .ok_or_else(|| GatewayError::BucketNotFound(bucket.to_string()))?;
        stored
            .objects
            .get(name)
            .map(|o| (o.meta.clone(), o.data.clone()))
            .ok_or_else(|| object_not_found(bucket, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn gateway_with_bucket() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway.create_bucket("media", "us-central1").await.unwrap();
        gateway
    }

    #[tokio::test]
    async fn duplicate_bucket_is_a_conflict() {
        let gateway = gateway_with_bucket().await;
        let err = gateway.create_bucket("media", "eu").await.unwrap_err();
        assert!(matches!(err, GatewayError::BucketAlreadyExists(name) if name == "media"));
        assert_eq!(gateway.list_buckets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn location_is_uppercased() {
        let gateway = gateway_with_bucket().await;
        assert_eq!(gateway.get_bucket("media").await.unwrap().location, "US-CENTRAL1");
    }

    #[tokio::test]
    async fn prefix_listing_returns_exact_matches() {
        let gateway = gateway_with_bucket().await;
        for name in ["a/1.txt", "a/2.txt", "ab.txt", "b/1.txt"] {
            gateway
                .put_object("media", name, Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }

        let names: Vec<String> = gateway
            .list_objects("media", Some("a/"))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["a/1.txt", "a/2.txt"]);

        let everything = gateway.list_objects("media", None).await.unwrap();
        assert_eq!(everything.len(), 4);

        assert!(gateway.list_objects("media", Some("zzz")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_missing_bucket_is_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway.list_objects("ghost", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn reupload_replaces_content() {
        let gateway = gateway_with_bucket().await;
        gateway
            .put_object("media", "f", Bytes::from_static(b"one"), "text/plain")
            .await
            .unwrap();
        gateway
            .put_object("media", "f", Bytes::from_static(b"three"), "text/csv")
            .await
            .unwrap();

        let (meta, data) = gateway.read_object("media", "f").await.unwrap();
        assert_eq!(data.as_ref(), b"three");
        assert_eq!(meta.size, 5);
        assert_eq!(meta.content_type.as_deref(), Some("text/csv"));
    }

    #[tokio::test]
    async fn delete_bucket_respects_force() {
        let gateway = gateway_with_bucket().await;
        gateway
            .put_object("media", "f", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();

        let err = gateway.delete_bucket("media", false).await.unwrap_err();
        assert!(matches!(err, GatewayError::BucketNotEmpty(_)));

        gateway.delete_bucket("media", true).await.unwrap();
        assert!(matches!(
            gateway.get_bucket("media").await.unwrap_err(),
            GatewayError::BucketNotFound(_)
        ));
    }

    #[tokio::test]
    async fn object_exists_folds_not_found() {
        let gateway = gateway_with_bucket().await;
        assert!(!gateway.object_exists("media", "nope").await.unwrap());
        gateway
            .put_object("media", "yes", Bytes::new(), "text/plain")
            .await
            .unwrap();
        assert!(gateway.object_exists("media", "yes").await.unwrap());
    }
}
