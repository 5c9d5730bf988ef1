//! HTTP handlers for bucket operations.

use crate::{errors::AppError, state::AppState};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body for `POST /buckets`.
#[derive(Debug, Deserialize)]
pub struct CreateBucketReq {
    pub bucket_name: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBucketQuery {
    pub force: Option<bool>,
}

#[derive(Serialize)]
pub struct BucketDetails {
    pub name: String,
    pub location: String,
}

#[derive(Serialize)]
pub struct CreateBucketResp {
    pub message: String,
    pub bucket_details: BucketDetails,
}

#[derive(Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub id: String,
    pub location: String,
}

#[derive(Serialize)]
pub struct ListBucketsResp {
    pub buckets: Vec<BucketSummary>,
}

#[derive(Serialize)]
pub struct BucketDetailResp {
    pub name: String,
    pub id: String,
    pub location: String,
    pub time_created: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct MessageResp {
    pub message: String,
}

/// POST `/buckets` — create bucket.
pub async fn create_bucket(
    State(state): State<AppState>,
    payload: Result<Json<CreateBucketReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let services = state.services()?;
    let payload = payload.map(|Json(p)| p).ok();
    let name = payload
        .as_ref()
        .and_then(|p| p.bucket_name.as_deref())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing bucket_name in request body"))?;
    let location = payload
        .as_ref()
        .and_then(|p| p.location.as_deref())
        .unwrap_or(&state.default_location);

    let bucket = services
        .gateway
        .create_bucket(name, location)
        .await
        .map_err(|err| AppError::from(err).context("Could not create bucket"))?;
    info!(bucket = %bucket.name, location = %bucket.location, "bucket created");

    Ok((
        StatusCode::CREATED,
        Json(CreateBucketResp {
            message: format!("Bucket {} created successfully.", bucket.name),
            bucket_details: BucketDetails {
                name: bucket.name,
                location: bucket.location,
            },
        }),
    ))
}

/// GET `/buckets` — list buckets.
pub async fn list_buckets(State(state): State<AppState>) -> Result<Json<ListBucketsResp>, AppError> {
    let services = state.services()?;
    let buckets = services
        .gateway
        .list_buckets()
        .await
        .map_err(|err| AppError::from(err).context("Could not list buckets"))?;

    Ok(Json(ListBucketsResp {
        buckets: buckets
            .into_iter()
            .map(|b| BucketSummary {
                name: b.name,
                id: b.id,
                location: b.location,
            })
            .collect(),
    }))
}

/// GET `/buckets/{bucket}` — bucket details.
pub async fn get_bucket(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<BucketDetailResp>, AppError> {
    let services = state.services()?;
    let Path(bucket) = path?;
    let bucket = services
        .gateway
        .get_bucket(&bucket)
        .await
        .map_err(|err| AppError::from(err).context("Could not retrieve bucket"))?;

    Ok(Json(BucketDetailResp {
        name: bucket.name,
        id: bucket.id,
        location: bucket.location,
        time_created: bucket.time_created,
    }))
}

/// DELETE `/buckets/{bucket}` — delete bucket, with its objects unless
/// `?force=false`.
pub async fn delete_bucket(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<DeleteBucketQuery>, QueryRejection>,
) -> Result<Json<MessageResp>, AppError> {
    let services = state.services()?;
    let Path(bucket) = path?;
    let Query(q) = query?;
    let force = q.force.unwrap_or(true);
    services
        .gateway
        .delete_bucket(&bucket, force)
        .await
        .map_err(|err| AppError::from(err).context("Could not delete bucket"))?;
    info!(bucket = %bucket, force, "bucket deleted");

    Ok(Json(MessageResp {
        message: format!("Bucket {} deleted successfully.", bucket),
    }))
}
