use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use meshdepot_core::models::AssetId;
use meshdepot_core::AppError;
use meshdepot_services::ViewerTarget;
use std::sync::Arc;

/// The preferred viewer Format's root as last reconciled.
#[utoipa::path(
    get,
    path = "/api/v0/assets/{asset_id}/viewer",
    tag = "assets",
    params(
        ("asset_id" = i64, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Viewer target", body = ViewerTarget),
        (status = 404, description = "Asset not found or not viewer compatible", body = ErrorResponse)
    )
)]
pub async fn get_viewer(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<AssetId>,
) -> Result<impl IntoResponse, HttpAppError> {
    let target = state
        .resolver
        .viewer_target(asset_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Asset {} is not viewer compatible", asset_id))
        })?;
    Ok(Json(target))
}
