//! Generation run endpoints: start, advance, progress

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::models::GenerationCriteria;
use crate::services::{AdvanceOutcome, StartOutcome};
use crate::AppState;

/// POST /api/generation/start request body (auth fields omitted)
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(flatten)]
    pub criteria: GenerationCriteria,
    /// Package the PDFs into a ZIP once the run completes
    #[serde(default)]
    pub create_zip: bool,
}

/// Body of advance and progress requests
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
}

impl JobRequest {
    /// An unparsable id names no job
    fn job_id(&self) -> ApiResult<Uuid> {
        Uuid::parse_str(self.job_id.trim()).map_err(|_| ApiError::NoProgressData)
    }
}

/// POST /api/generation/start
pub async fn start_generation(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .executor()
        .start(&request.criteria, request.create_zip)
        .await?;

    Ok(Json(match outcome {
        StartOutcome::NoMatches => json!({
            "success": true,
            "count": 0,
            "message": "No transactions found matching the criteria.",
        }),
        StartOutcome::Started {
            job_id,
            total,
            batch_size,
        } => json!({
            "success": true,
            "job_id": job_id,
            "total": total,
            "batch_size": batch_size,
            "message": format!("Starting batch processing for {} transactions...", total),
        }),
    }))
}

/// POST /api/generation/advance
pub async fn advance_generation(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> ApiResult<Json<Value>> {
    let job_id = request.job_id()?;

    match state.executor().advance(job_id).await? {
        AdvanceOutcome::NoProgressData => Err(ApiError::NoProgressData),
        AdvanceOutcome::RendererUnavailable => Err(ApiError::RendererUnavailable),
        AdvanceOutcome::Advanced {
            processed,
            successful,
            batch_errors,
            remaining,
            total,
        } => Ok(Json(json!({
            "success": true,
            "complete": false,
            "processed": processed,
            "successful": successful,
            "errors": batch_errors,
            "remaining": remaining,
            "total": total,
        }))),
        AdvanceOutcome::Completed {
            processed,
            successful,
            errors,
            packaging_requested,
            message,
        } => {
            info!(job_id = %job_id, "{}", message);
            Ok(Json(json!({
                "success": true,
                "complete": true,
                "message": message,
                "processed": processed,
                "successful": successful,
                "errors": errors,
                "remaining": 0,
                "packaging_requested": packaging_requested,
            })))
        }
    }
}

/// POST /api/generation/progress
pub async fn generation_progress(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> ApiResult<Json<Value>> {
    let job_id = request.job_id()?;

    let snapshot = state
        .executor()
        .progress(job_id)
        .await?
        .ok_or(ApiError::NoProgressData)?;

    Ok(Json(json!({
        "success": true,
        "job_id": snapshot.job_id,
        "processed": snapshot.processed,
        "total": snapshot.total,
        "successful": snapshot.successful,
        "errors": snapshot.errors,
        "remaining": snapshot.remaining,
        "percentage": snapshot.percentage,
    })))
}
