//! src/services/gcs_gateway.rs
//!
//! GcsGateway — StorageGateway over the Cloud Storage JSON API. Every call is
//! authorized with a bearer token from the CredentialResolver and maps the
//! provider's HTTP status back into a [`GatewayError`]:
//!
//! - 404 → `BucketNotFound` / `ObjectNotFound`
//! - 409 on bucket insert → `BucketAlreadyExists`
//! - 409 on bucket delete → `BucketNotEmpty`
//! - anything else non-2xx → `Provider` carrying the provider's message

use crate::{
    models::{bucket::Bucket, object::Object},
    services::{
        canonical::uri_encode,
        credentials::CredentialResolver,
        storage_gateway::{GatewayError, GatewayResult, StorageGateway},
    },
};
use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketResource {
    id: Option<String>,
    name: String,
    location: Option<String>,
    time_created: Option<DateTime<Utc>>,
}

impl From<BucketResource> for Bucket {
    fn from(res: BucketResource) -> Self {
        Bucket {
            id: res.id.unwrap_or_else(|| res.name.clone()),
            name: res.name,
            location: res.location.unwrap_or_default(),
            time_created: res.time_created.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    bucket: String,
    name: String,
    /// The JSON API encodes 64-bit integers as strings.
    size: Option<String>,
    content_type: Option<String>,
    updated: Option<DateTime<Utc>>,
    md5_hash: Option<String>,
}

impl From<ObjectResource> for Object {
    fn from(res: ObjectResource) -> Self {
        Object {
            bucket: res.bucket,
            name: res.name,
            size: res.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            content_type: res.content_type,
            updated: res.updated.unwrap_or_else(Utc::now),
            md5_hash: res.md5_hash,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
struct InsertBucket<'a> {
    name: &'a str,
    location: &'a str,
}

pub struct GcsGateway {
    client: reqwest::Client,
    api_base: String,
    project: String,
    credentials: Arc<dyn CredentialResolver>,
}

impl GcsGateway {
    /// Build the gateway. Fails when no project is configured, since bucket
    /// listing and creation are project-scoped.
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        project: Option<String>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> anyhow::Result<Self> {
        let project = match project {
            Some(p) if !p.trim().is_empty() => p,
            _ => bail!("no project configured (set GCP_PROJECT or --project)"),
        };
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            project,
            credentials,
        })
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/b/{}", self.api_base, uri_encode(bucket))
    }

    fn object_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/o/{}", self.bucket_url(bucket), uri_encode(name))
    }

    async fn authorized(&self, method: Method, url: &str) -> GatewayResult<RequestBuilder> {
        let identity = self
            .credentials
            .resolve_signing_identity()
            .await
            .map_err(|err| GatewayError::Provider(err.to_string()))?;
        Ok(self.client.request(method, url).bearer_auth(identity.token))
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        request
            .send()
            .await
            .map_err(|err| GatewayError::Provider(format!("request to storage API failed: {err}")))
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> GatewayResult<T> {
        resp.json()
            .await
            .map_err(|err| GatewayError::Provider(format!("unexpected storage API response: {err}")))
    }

    /// Turn a non-success response into a gateway error. `not_found` and
    /// `conflict` supply the classified variants for this call.
    async fn failure(
        resp: Response,
        not_found: impl FnOnce() -> GatewayError,
        conflict: Option<GatewayError>,
    ) -> GatewayError {
        let status = resp.status();
        match (status, conflict) {
            (StatusCode::NOT_FOUND, _) => not_found(),
            (StatusCode::CONFLICT, Some(err)) => err,
            _ => {
                let body = resp.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorEnvelope>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                warn!(%status, message = %message, "storage API call failed");
                GatewayError::Provider(format!("{status}: {message}"))
            }
        }
    }

    async fn list_all<T: DeserializeOwned>(
        &self,
        url: &str,
        base_query: &[(&str, &str)],
        not_found: impl Fn() -> GatewayError,
    ) -> GatewayResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.authorized(Method::GET, url).await?.query(base_query);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let resp = self.send(request).await?;
            if !resp.status().is_success() {
                return Err(Self::failure(resp, &not_found, None).await);
            }
            let page: ListPage<T> = Self::decode(resp).await?;
            items.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl StorageGateway for GcsGateway {
    fn backend(&self) -> &'static str {
        "gcs"
    }

    async fn create_bucket(&self, name: &str, location: &str) -> GatewayResult<Bucket> {
        let url = format!("{}/storage/v1/b", self.api_base);
        let request = self
            .authorized(Method::POST, &url)
            .await?
            .query(&[("project", self.project.as_str())])
            .json(&InsertBucket { name, location });
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return Err(Self::failure(
                resp,
                || GatewayError::Provider(format!("project `{}` not found", self.project)),
                Some(GatewayError::BucketAlreadyExists(name.to_string())),
            )
            .await);
        }
        let bucket: BucketResource = Self::decode(resp).await?;
        debug!(bucket = %bucket.name, "bucket inserted");
        Ok(bucket.into())
    }

    async fn get_bucket(&self, name: &str) -> GatewayResult<Bucket> {
        let request = self.authorized(Method::GET, &self.bucket_url(name)).await?;
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return Err(
                Self::failure(resp, || GatewayError::BucketNotFound(name.to_string()), None).await,
            );
        }
        Ok(Self::decode::<BucketResource>(resp).await?.into())
    }

    async fn list_buckets(&self) -> GatewayResult<Vec<Bucket>> {
        let url = format!("{}/storage/v1/b", self.api_base);
        let buckets: Vec<BucketResource> = self
            .list_all(&url, &[("project", self.project.as_str())], || {
                GatewayError::Provider(format!("project `{}` not found", self.project))
            })
            .await?;
        Ok(buckets.into_iter().map(Bucket::from).collect())
    }

    async fn delete_bucket(&self, name: &str, force: bool) -> GatewayResult<()> {
        if force {
            for object in self.list_objects(name, None).await? {
                match self.delete_object(name, &object.name).await {
                    Ok(()) | Err(GatewayError::ObjectNotFound { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        let request = self.authorized(Method::DELETE, &self.bucket_url(name)).await?;
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return Err(Self::failure(
                resp,
                || GatewayError::BucketNotFound(name.to_string()),
                Some(GatewayError::BucketNotEmpty(name.to_string())),
            )
            .await);
        }
        Ok(())
    }

    async fn get_object(&self, bucket: &str, name: &str) -> GatewayResult<Object> {
        let request = self.authorized(Method::GET, &self.object_url(bucket, name)).await?;
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return Err(Self::failure(
                resp,
                || GatewayError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                },
                None,
            )
            .await);
        }
        Ok(Self::decode::<ObjectResource>(resp).await?.into())
    }

    async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> GatewayResult<Vec<Object>> {
        let url = format!("{}/o", self.bucket_url(bucket));
        let query: Vec<(&str, &str)> = prefix.map(|p| vec![("prefix", p)]).unwrap_or_default();
        let objects: Vec<ObjectResource> = self
            .list_all(&url, &query, || GatewayError::BucketNotFound(bucket.to_string()))
            .await?;
        Ok(objects.into_iter().map(Object::from).collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> GatewayResult<Object> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.api_base,
            uri_encode(bucket)
        );
        let request = self
            .authorized(Method::POST, &url)
            .await?
            .query(&[("uploadType", "media"), ("name", name)])
            .header(header::CONTENT_TYPE, content_type)
            .body(data);
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return Err(
                Self::failure(resp, || GatewayError::BucketNotFound(bucket.to_string()), None).await,
            );
        }
        Ok(Self::decode::<ObjectResource>(resp).await?.into())
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> GatewayResult<()> {
        let request = self
            .authorized(Method::DELETE, &self.object_url(bucket, name))
            .await?;
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return Err(Self::failure(
                resp,
                || GatewayError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                },
                None,
            )
            .await);
        }
        Ok(())
    }

    async fn read_object(&self, bucket: &str, name: &str) -> GatewayResult<(Object, Bytes)> {
        let object = self.get_object(bucket, name).await?;
        let request = self
            .authorized(Method::GET, &self.object_url(bucket, name))
            .await?
            .query(&[("alt", "media")]);
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return Err(Self::failure(
                resp,
                || GatewayError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                },
                None,
            )
            .await);
        }
        let data = resp
            .bytes()
            .await
            .map_err(|err| GatewayError::Provider(format!("reading object body: {err}")))?;
        Ok((object, data))
    }
}
