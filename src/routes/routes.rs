//! Defines routes for all bucket, file, and directory operations.
//!
//! ## Structure
//! - **Service endpoints**
//!   - `GET    /`, `/healthz`, `/readyz`
//!
//! - **Bucket-level endpoints**
//!   - `POST   /buckets` — create bucket
//!   - `GET    /buckets` — list buckets
//!   - `GET    /buckets/{bucket}` — bucket details
//!   - `DELETE /buckets/{bucket}` — delete bucket
//!
//! - **File-level endpoints**
//!   - `POST   /buckets/{bucket}/files` — multipart upload
//!   - `GET    /buckets/{bucket}/files` — list files (supports prefix)
//!   - `GET    /buckets/{bucket}/files/{*file}` — signed download URL
//!   - `DELETE /buckets/{bucket}/files/{*file}` — delete file
//!
//! - **Directory endpoints**
//!   - `POST   /buckets/{bucket}/directories` — create marker
//!   - `DELETE /buckets/{bucket}/directories/{*directory}` — delete prefix
//!
//! - **Local signed downloads**
//!   - `GET    /download/{bucket}/{*file}`
//!
//! The wildcard segments allow nested names like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, get_bucket, list_buckets},
        directory_handlers::{create_directory, delete_directory},
        download_handlers::signed_download,
        file_handlers::{delete_file, download_file, list_files, upload_file},
        health_handlers::{healthz, index, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Uploads are buffered in memory, so cap them.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Build the router for every route. Handlers share `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/buckets", post(create_bucket).get(list_buckets))
        .route("/buckets/{bucket}", get(get_bucket).delete(delete_bucket))
        // File-level routes
        .route(
            "/buckets/{bucket}/files",
            post(upload_file)
                .get(list_files)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/buckets/{bucket}/files/{*file}",
            get(download_file).delete(delete_file),
        )
        // Directory routes
        .route("/buckets/{bucket}/directories", post(create_directory))
        .route(
            "/buckets/{bucket}/directories/{*directory}",
            delete(delete_directory),
        )
        .route("/download/{bucket}/{*file}", get(signed_download))
}

/// Routes with state, CORS open to every origin, and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes()
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
