//! Serves signed downloads when URLs are signed with a local key.
//!
//! With the Cloud Storage backend the provider serves signed URLs itself
//! and this route always answers 404.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{Path, RawQuery, State, rejection::PathRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::warn;

/// GET `/download/{bucket}/{*file}` — verify the signature, then return the
/// object's bytes.
pub async fn signed_download(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let services = state.services()?;
    let Path((bucket, file)) = path?;
    let verifier = services
        .verifier
        .as_ref()
        .ok_or_else(|| AppError::not_found("Signed downloads are served by the storage provider."))?;

    if let Err(err) = verifier.verify(&bucket, &file, query.as_deref().unwrap_or(""), Utc::now()) {
        warn!(bucket = %bucket, object = %file, error = %err, "rejected signed download");
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            format!("Access denied: {err}"),
        ));
    }

    let (object, data) = services
        .gateway
        .read_object(&bucket, &file)
        .await
        .map_err(|err| AppError::from(err).context("Could not read file"))?;

    let content_type = object
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}
