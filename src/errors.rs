use crate::services::{
    directory::DirectoryError, signed_url::IssueError, storage_gateway::GatewayError,
};
use axum::{
    Json,
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Prefix unclassified (500) failures with what was being attempted.
    /// Classified errors keep their own message.
    pub fn context(mut self, what: &str) -> Self {
        if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            self.message = format!("{what}: {}", self.message);
        }
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        }
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::bad_request(format!("Invalid query string: {}", err.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        AppError::bad_request(format!("Invalid path: {}", err.body_text()))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::BucketNotFound(_) | GatewayError::ObjectNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            GatewayError::BucketAlreadyExists(_) | GatewayError::BucketNotEmpty(_) => {
                StatusCode::CONFLICT
            }
            GatewayError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Gateway(inner) => inner.into(),
            other => AppError::not_found(other.to_string()),
        }
    }
}

impl From<IssueError> for AppError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::ObjectNotFound { .. } => AppError::not_found(err.to_string()),
            IssueError::Gateway(inner) => inner.into(),
            other => AppError::internal(other.to_string()),
        }
    }
}
