use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::owner::OwnerId;
use crate::state::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use meshdepot_core::models::{AssetId, NewAsset};
use meshdepot_core::AppError;
use meshdepot_services::ingest::precheck;
use meshdepot_services::UploadItem;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadAccepted {
    pub upload_job: Uuid,
    pub asset_id: AssetId,
}

/// Browsers may send a client-side path; only the last segment is kept.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim()
}

async fn read_items(mut multipart: Multipart) -> Result<Vec<UploadItem>, HttpAppError> {
    let mut items = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(base_name)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .ok_or_else(|| {
                AppError::BadRequest("Every file part needs a file name".to_string())
            })?;
        let data = field.bytes().await?;
        tracing::debug!(file_name = %file_name, size = data.len(), "Received upload part");
        items.push(UploadItem::new(file_name, data));
    }
    Ok(items)
}

/// Upload a 3D model batch
///
/// Accepts any number of `file` parts (model files, their dependencies, or zip
/// archives). A new asset is created and ingestion runs in the background; poll
/// the returned job for the outcome.
#[utoipa::path(
    post,
    path = "/api/v0/assets/uploads",
    tag = "uploads",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    params(
        ("x-owner-id" = Uuid, Header, description = "Owner of the new asset")
    ),
    responses(
        (status = 202, description = "Upload accepted", body = UploadAccepted),
        (status = 400, description = "No files or no recognizable model file", body = ErrorResponse),
        (status = 401, description = "Missing owner", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart), fields(owner_id = %owner.0))]
pub async fn upload_asset(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let items = read_items(multipart).await?;
    precheck(&items)?;

    let asset = state.assets().create_asset(NewAsset::untitled(owner.0)).await?;
    let job = state
        .upload_queue
        .submit(asset.id, owner.0, items)
        .await?;

    tracing::info!(asset_id = %asset.id, job_id = %job.id, "Upload accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            upload_job: job.id,
            asset_id: asset.id,
        }),
    ))
}
