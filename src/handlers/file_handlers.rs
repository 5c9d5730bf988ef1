//! HTTP handlers for file (object) operations.
//!
//! Uploads arrive as multipart forms and are buffered in memory before being
//! handed to the gateway. Downloads never stream bytes through the facade;
//! the client gets a signed URL instead.

use crate::{errors::AppError, handlers::bucket_handlers::MessageResp, state::AppState};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartRejection,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub prefix: Option<String>,
}

#[derive(Serialize)]
pub struct FileDetails {
    pub name: String,
    pub bucket: String,
    pub size: u64,
    pub content_type: Option<String>,
}

#[derive(Serialize)]
pub struct UploadResp {
    pub message: String,
    pub file_details: FileDetails,
}

#[derive(Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub updated: DateTime<Utc>,
    pub content_type: Option<String>,
}

#[derive(Serialize)]
pub struct ListFilesResp {
    pub files: Vec<FileEntry>,
    pub bucket: String,
    pub prefix_filter: Option<String>,
}

#[derive(Serialize)]
pub struct DownloadResp {
    pub file_name: String,
    pub bucket: String,
    pub download_url: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub expires_at: DateTime<Utc>,
}

struct UploadedFile {
    filename: String,
    content_type: String,
    data: Bytes,
}

/// Reduce a client-supplied filename to a safe single path segment.
///
/// Path separators become spaces, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9._-]` is dropped, and `.`/`_` are stripped from both
/// ends so the result is never `..` or a hidden name.
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    kept.trim_start_matches(['.', '_'])
        .trim_end_matches(['.', '_'])
        .to_string()
}

/// Normalize an optional upload prefix to end with `/`.
fn normalize_prefix(prefix: Option<String>) -> String {
    match prefix {
        Some(p) if !p.is_empty() && !p.ends_with('/') => format!("{p}/"),
        Some(p) => p,
        None => String::new(),
    }
}

async fn read_upload_form(
    mut multipart: Multipart,
) -> Result<(Option<UploadedFile>, Option<String>), AppError> {
    let mut file = None;
    let mut prefix = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Malformed multipart body: {err}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("Could not read file part: {err}")))?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            Some("object_prefix") => {
                prefix = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("Could not read object_prefix: {err}"))
                })?);
            }
            other => debug!(field = ?other, "ignoring unknown form field"),
        }
    }
    Ok((file, prefix))
}

/// POST `/buckets/{bucket}/files` — multipart upload.
pub async fn upload_file(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let services = state.services()?;
    let Path(bucket) = path?;
    let multipart = multipart.map_err(|_| AppError::bad_request("No file part in the request"))?;
    let (file, prefix) = read_upload_form(multipart).await?;
    let file = file.ok_or_else(|| AppError::bad_request("No file part in the request"))?;
    if file.filename.is_empty() {
        return Err(AppError::bad_request("No selected file"));
    }
    let safe_name = secure_filename(&file.filename);
    if safe_name.is_empty() {
        return Err(AppError::bad_request(format!(
            "Filename '{}' has no usable characters",
            file.filename
        )));
    }

    services.gateway.get_bucket(&bucket).await?;

    let object_name = format!("{}{}", normalize_prefix(prefix), safe_name);
    let object = services
        .gateway
        .put_object(&bucket, &object_name, file.data, &file.content_type)
        .await
        .map_err(|err| {
            AppError::from(err).context(&format!("Could not upload file '{}'", object_name))
        })?;
    info!(bucket = %bucket, object = %object.name, size = object.size, "file uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResp {
            message: format!(
                "File {} uploaded successfully to {}.",
                object.name, bucket
            ),
            file_details: FileDetails {
                name: object.name,
                bucket: object.bucket,
                size: object.size,
                content_type: object.content_type,
            },
        }),
    ))
}

/// GET `/buckets/{bucket}/files` — list files, optionally under `?prefix=`.
pub async fn list_files(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ListFilesQuery>, QueryRejection>,
) -> Result<Json<ListFilesResp>, AppError> {
    let services = state.services()?;
    let Path(bucket) = path?;
    let Query(q) = query?;
    let objects = services
        .gateway
        .list_objects(&bucket, q.prefix.as_deref())
        .await
        .map_err(|err| {
            AppError::from(err).context(&format!("Could not list files in bucket {}", bucket))
        })?;

    Ok(Json(ListFilesResp {
        files: objects
            .into_iter()
            .map(|o| FileEntry {
                name: o.name,
                size: o.size,
                updated: o.updated,
                content_type: o.content_type,
            })
            .collect(),
        bucket,
        prefix_filter: q.prefix,
    }))
}

/// GET `/buckets/{bucket}/files/{*file}` — issue a signed download URL.
pub async fn download_file(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<DownloadResp>, AppError> {
    let services = state.services()?;
    let Path((bucket, file)) = path?;
    services.gateway.get_bucket(&bucket).await?;

    let (object, grant) = services
        .issuer
        .issue_download_url(&bucket, &file)
        .await
        .map_err(|err| {
            AppError::from(err).context(&format!("Could not generate signed URL for {}", file))
        })?;

    Ok(Json(DownloadResp {
        file_name: object.name,
        bucket: object.bucket,
        download_url: grant.url,
        size: object.size,
        content_type: object.content_type,
        expires_at: grant.expires_at,
    }))
}

/// DELETE `/buckets/{bucket}/files/{*file}` — delete a single file.
pub async fn delete_file(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<MessageResp>, AppError> {
    let services = state.services()?;
    let Path((bucket, file)) = path?;
    services.gateway.get_bucket(&bucket).await?;

    let context = format!("Could not delete file {}", file);
    let exists = services
        .gateway
        .object_exists(&bucket, &file)
        .await
        .map_err(|err| AppError::from(err).context(&context))?;
    if !exists {
        return Err(AppError::not_found(format!(
            "File {} not found in bucket {}.",
            file, bucket
        )));
    }
    services
        .gateway
        .delete_object(&bucket, &file)
        .await
        .map_err(|err| AppError::from(err).context(&context))?;
    info!(bucket = %bucket, object = %file, "file deleted");

    Ok(Json(MessageResp {
        message: format!("File {} deleted successfully from bucket {}.", file, bucket),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_filename_strips_paths_and_oddities() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("i contain cool \u{00fc}ml\u{00e4}uts.txt"), "i_contain_cool_mluts.txt");
        assert_eq!(secure_filename(".hidden"), "hidden");
        assert_eq!(secure_filename("..."), "");
        assert_eq!(secure_filename("report-2025_v2.PDF"), "report-2025_v2.PDF");
    }

    #[test]
    fn prefix_gets_single_trailing_separator() {
        assert_eq!(normalize_prefix(None), "");
        assert_eq!(normalize_prefix(Some(String::new())), "");
        assert_eq!(normalize_prefix(Some("docs".into())), "docs/");
        assert_eq!(normalize_prefix(Some("docs/".into())), "docs/");
    }
}
