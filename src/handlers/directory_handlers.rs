//! HTTP handlers for emulated directories.

use crate::{errors::AppError, handlers::bucket_handlers::MessageResp, state::AppState};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

/// Body for `POST /buckets/{bucket}/directories`.
#[derive(Debug, Deserialize)]
pub struct CreateDirectoryReq {
    pub directory_name: Option<String>,
}

#[derive(Serialize)]
pub struct DeleteDirectoryResp {
    pub message: String,
    pub deleted: usize,
}

/// POST `/buckets/{bucket}/directories` — write a directory marker.
pub async fn create_directory(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<CreateDirectoryReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let services = state.services()?;
    let Path(bucket) = path?;
    let name = payload
        .ok()
        .and_then(|Json(p)| p.directory_name)
        .filter(|n| !n.trim_matches('/').is_empty())
        .ok_or_else(|| AppError::bad_request("Missing directory_name in request body"))?;

    let directory = services
        .directories
        .create_directory(&bucket, &name)
        .await
        .map_err(|err| AppError::from(err).context("Could not create directory"))?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResp {
            message: format!(
                "Directory {} created successfully in {}.",
                directory, bucket
            ),
        }),
    ))
}

/// DELETE `/buckets/{bucket}/directories/{*directory}` — delete a directory
/// marker and everything under it.
pub async fn delete_directory(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<DeleteDirectoryResp>, AppError> {
    let services = state.services()?;
    let Path((bucket, directory)) = path?;
    let (directory, deleted) = services
        .directories
        .delete_directory(&bucket, &directory)
        .await
        .map_err(|err| AppError::from(err).context("Could not delete directory"))?;

    Ok(Json(DeleteDirectoryResp {
        message: format!(
            "Directory {} and all its contents deleted successfully.",
            directory
        ),
        deleted,
    }))
}
