use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use meshdepot_core::models::{AssetId, JobStatus, UploadJob};
use meshdepot_core::AppError;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadJobResponse {
    pub id: Uuid,
    pub asset_id: AssetId,
    pub status: JobStatus,
    /// Ingestion report, once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<UploadJob> for UploadJobResponse {
    fn from(job: UploadJob) -> Self {
        Self {
            id: job.id,
            asset_id: job.asset_id,
            status: job.status,
            report: job.report,
            error: job.error,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v0/uploads/{job_id}",
    tag = "uploads",
    params(
        ("job_id" = Uuid, Path, description = "Upload job ID")
    ),
    responses(
        (status = 200, description = "Upload job status", body = UploadJobResponse),
        (status = 404, description = "Upload job not found", body = ErrorResponse)
    )
)]
pub async fn get_upload_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let job = state
        .db
        .jobs
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload job {} not found", job_id)))?;

    Ok(Json(UploadJobResponse::from(job)))
}
