//! File management endpoints: packaging, stats, bulk delete, downloads

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use mpbi_common::GenerationEvent;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use super::error::{ApiError, ApiResult};
use crate::services::{file_manager, packager, ArchiveInfo};
use crate::AppState;

/// Route prefix archives are downloaded from
pub const DOWNLOADS_PREFIX: &str = "/downloads";

fn archive_response(state: &AppState, info: ArchiveInfo) -> Json<Value> {
    state.event_bus.emit_lossy(GenerationEvent::ArchiveCreated {
        filename: info.filename.clone(),
        file_count: info.file_count,
    });

    Json(json!({
        "success": true,
        "message": "ZIP file created successfully!",
        "zip_url": format!("{}/{}", DOWNLOADS_PREFIX, info.filename),
        "zip_filename": info.filename,
        "file_count": info.file_count,
    }))
}

/// Run a blocking file operation off the async runtime
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        ApiError::Common(mpbi_common::Error::Internal(format!(
            "File task failed: {}",
            e
        )))
    })?
}

/// POST /api/files/archive
pub async fn create_archive(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let info = packager::package(state.config.output_dir.clone()).await?;
    Ok(archive_response(&state, info))
}

/// POST /api/files/download-all
///
/// Same as the archive endpoint, but refuses when there are no PDFs.
pub async fn download_all(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let info = packager::package_for_download(state.config.output_dir.clone()).await?;
    Ok(archive_response(&state, info))
}

/// POST /api/files/stats
pub async fn file_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let output_dir = state.config.output_dir.clone();
    let stats = blocking(move || Ok(file_manager::file_stats(&output_dir)?)).await?;

    Ok(Json(json!({
        "success": true,
        "pdf_count": stats.pdf_count,
        "total_size": stats.total_size,
        "total_size_formatted": stats.total_size_formatted,
        "archive_count": stats.archive_count,
    })))
}

/// POST /api/files/delete
pub async fn delete_files(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let output_dir = state.config.output_dir.clone();
    let report = blocking(move || Ok(file_manager::delete_all(&output_dir)?)).await?;

    if report.deleted_count > 0 {
        state.event_bus.emit_lossy(GenerationEvent::FilesDeleted {
            deleted: report.deleted_count,
        });
    }

    Ok(Json(json!({
        "success": report.deleted_count > 0,
        "message": report.message,
        "deleted_count": report.deleted_count,
        "errors": report.errors,
    })))
}

/// GET /downloads/:filename
pub async fn download_archive(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = file_manager::resolve_archive(&state.config.output_dir, &filename)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("File not found: {}", filename)))?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
