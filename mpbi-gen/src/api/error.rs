//! HTTP error type for mpbi-gen handlers
//!
//! Every failure renders as
//! `{"success": false, "error": {"code": ..., "message": ...}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mpbi_common::api::ErrorBody;
use thiserror::Error;
use tracing::error;

use crate::services::{FileError, PackagingError, StartError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Criteria or request validation failed (400)
    #[error("{0}")]
    Validation(String),

    /// No job with the requested id (404)
    #[error("No progress data found.")]
    NoProgressData,

    /// Renderer prerequisite missing (503)
    #[error("Invoice renderer is not available.")]
    RendererUnavailable,

    /// Output directory missing (404)
    #[error("PDF directory not found.")]
    DirectoryNotFound,

    /// Nothing to package for a download (404)
    #[error("No PDF files found to download.")]
    NoPdfFiles,

    /// Archive could not be written (500)
    #[error("Failed to create ZIP file.")]
    ArchiveFailed(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Malformed request (400)
    #[error("{0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Common error: {0}")]
    Common(#[from] mpbi_common::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            ApiError::NoProgressData => (StatusCode::NOT_FOUND, "NO_PROGRESS_DATA"),
            ApiError::RendererUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "RENDERER_UNAVAILABLE")
            }
            ApiError::DirectoryNotFound => (StatusCode::NOT_FOUND, "DIRECTORY_NOT_FOUND"),
            ApiError::NoPdfFiles => (StatusCode::NOT_FOUND, "NO_PDF_FILES"),
            ApiError::ArchiveFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ARCHIVE_FAILED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        match &self {
            ApiError::ArchiveFailed(detail) => error!("Archive creation failed: {}", detail),
            ApiError::Io(_) | ApiError::Common(_) => error!("Request failed: {}", self),
            _ => {}
        }

        (status, Json(ErrorBody::new(code, self.to_string()))).into_response()
    }
}

impl From<StartError> for ApiError {
    fn from(e: StartError) -> Self {
        match e {
            StartError::Invalid(invalid) => ApiError::Validation(invalid.to_string()),
            StartError::Store(store) => ApiError::Common(store),
        }
    }
}

impl From<PackagingError> for ApiError {
    fn from(e: PackagingError) -> Self {
        match e {
            PackagingError::DirectoryNotFound(_) => ApiError::DirectoryNotFound,
            PackagingError::NoPdfFiles => ApiError::NoPdfFiles,
            PackagingError::ArchiveFailed(detail) => ApiError::ArchiveFailed(detail),
        }
    }
}

impl From<FileError> for ApiError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::DirectoryNotFound(_) => ApiError::DirectoryNotFound,
            FileError::InvalidName(name) => ApiError::BadRequest(format!("Invalid file name: {}", name)),
            FileError::NotFound(name) => ApiError::NotFound(format!("File not found: {}", name)),
            FileError::Io(io) => ApiError::Io(io),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
