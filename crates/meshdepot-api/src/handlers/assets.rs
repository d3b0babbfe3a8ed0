//! Asset reads and curator/pipeline mutations.

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::owner::{owned_asset, OwnerId};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use meshdepot_core::models::{
    Asset, AssetId, AssetStatus, Format, FormatId, FormatType, License, Resource, ResourceId,
    Role,
};
use meshdepot_core::AppError;
use meshdepot_services::FinalizeRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceResponse {
    pub id: ResourceId,
    pub file_name: String,
    /// Absent when the resource has neither a stored file nor an external URL
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub hosted: bool,
}

impl From<&Resource> for ResourceResponse {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id,
            file_name: resource.file_name.clone(),
            url: resource.resolved_url().map(String::from),
            content_type: resource.content_type.clone(),
            hosted: resource.file.is_some(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FormatResponse {
    pub id: FormatId,
    pub format_type: FormatType,
    pub role: Role,
    pub label: String,
    pub archive_url: Option<String>,
    pub root: Option<ResourceResponse>,
    pub resources: Vec<ResourceResponse>,
    pub is_preferred_for_viewer: bool,
    pub is_preferred_for_download: bool,
    pub triangle_count: Option<i64>,
    pub lineage_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Format> for FormatResponse {
    fn from(format: &Format) -> Self {
        Self {
            id: format.id,
            format_type: format.format_type,
            role: format.role,
            label: format.download_label(),
            archive_url: format.archive_url.clone(),
            root: format.root().map(ResourceResponse::from),
            resources: format
                .state
                .resources()
                .iter()
                .map(ResourceResponse::from)
                .collect(),
            is_preferred_for_viewer: format.is_preferred_for_viewer,
            is_preferred_for_download: format.is_preferred_for_download,
            triangle_count: format.triangle_count,
            lineage_id: format.lineage_id.clone(),
            created_at: format.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssetResponse {
    pub id: AssetId,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub license: Option<License>,
    pub status: AssetStatus,
    pub is_blocks_origin: bool,
    pub thumbnail_url: Option<String>,
    pub preferred_viewer_override_id: Option<FormatId>,
    pub preferred_viewer_format_id: Option<FormatId>,
    pub is_viewer_compatible: bool,
    pub formats: Vec<FormatResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetResponse {
    fn new(asset: Asset, formats: &[Format]) -> Self {
        Self {
            id: asset.id,
            owner_id: asset.owner_id,
            name: asset.name,
            description: asset.description,
            license: asset.license,
            status: asset.status,
            is_blocks_origin: asset.is_blocks_origin,
            thumbnail_url: asset.thumbnail.map(|t| t.url),
            preferred_viewer_override_id: asset.preferred_viewer_override_id,
            preferred_viewer_format_id: asset.preferred_viewer_format_id,
            is_viewer_compatible: asset.is_viewer_compatible,
            formats: formats.iter().map(FormatResponse::from).collect(),
            created_at: asset.created_at,
            updated_at: asset.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ViewerOverrideRequest {
    /// `null` clears the override
    pub format_id: Option<FormatId>,
}

#[utoipa::path(
    get,
    path = "/api/v0/assets/{asset_id}",
    tag = "assets",
    params(
        ("asset_id" = i64, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Asset with its formats", body = AssetResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<AssetId>,
) -> Result<impl IntoResponse, HttpAppError> {
    let asset = state
        .assets()
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;
    let formats = state.assets().list_formats(asset_id).await?;

    Ok(Json(AssetResponse::new(asset, &formats)))
}

/// Apply final format metadata and mark the asset complete
///
/// Succeeds once per asset; later calls answer 409.
#[utoipa::path(
    post,
    path = "/api/v0/assets/{asset_id}/finalize",
    tag = "assets",
    params(
        ("asset_id" = i64, Path, description = "Asset ID"),
        ("x-owner-id" = Uuid, Header, description = "Asset owner")
    ),
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Asset finalized; body is the viewer choice", body = Object),
        (status = 404, description = "Asset or format not found", body = ErrorResponse),
        (status = 409, description = "Asset already finalized", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(asset_id = %asset_id))]
pub async fn finalize_asset(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Path(asset_id): Path<AssetId>,
    ValidatedJson(request): ValidatedJson<FinalizeRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    owned_asset(state.assets().as_ref(), asset_id, owner).await?;
    let choice = state.ingestion.finalize(asset_id, request).await?;
    Ok(Json(choice))
}

#[utoipa::path(
    get,
    path = "/api/v0/assets/{asset_id}/downloads",
    tag = "assets",
    params(
        ("asset_id" = i64, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Download entries keyed by label", body = Object),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn get_downloads(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<AssetId>,
) -> Result<impl IntoResponse, HttpAppError> {
    let downloads = state.bundler.downloads(asset_id).await?;
    Ok(Json(downloads))
}

#[utoipa::path(
    put,
    path = "/api/v0/assets/{asset_id}/viewer-override",
    tag = "assets",
    params(
        ("asset_id" = i64, Path, description = "Asset ID"),
        ("x-owner-id" = Uuid, Header, description = "Asset owner")
    ),
    request_body = ViewerOverrideRequest,
    responses(
        (status = 200, description = "Override stored; body is the viewer choice", body = Object),
        (status = 404, description = "Asset or format not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(asset_id = %asset_id))]
pub async fn set_viewer_override(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Path(asset_id): Path<AssetId>,
    ValidatedJson(request): ValidatedJson<ViewerOverrideRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    owned_asset(state.assets().as_ref(), asset_id, owner).await?;

    if let Some(format_id) = request.format_id {
        state
            .assets()
            .get_format(format_id)
            .await?
            .filter(|f| f.asset_id == asset_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Format {} not found on asset {}",
                    format_id, asset_id
                ))
            })?;
    }

    state
        .assets()
        .set_viewer_override(asset_id, request.format_id)
        .await?;
    let choice = state.resolver.reconcile(asset_id).await?;
    Ok(Json(choice))
}

#[utoipa::path(
    delete,
    path = "/api/v0/assets/{asset_id}/formats/{format_id}",
    tag = "assets",
    params(
        ("asset_id" = i64, Path, description = "Asset ID"),
        ("format_id" = i64, Path, description = "Format ID"),
        ("x-owner-id" = Uuid, Header, description = "Asset owner")
    ),
    responses(
        (status = 204, description = "Format deleted"),
        (status = 404, description = "Asset or format not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(asset_id = %asset_id, format_id = %format_id))]
pub async fn delete_format(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Path((asset_id, format_id)): Path<(AssetId, FormatId)>,
) -> Result<impl IntoResponse, HttpAppError> {
    owned_asset(state.assets().as_ref(), asset_id, owner).await?;

    let not_found =
        || AppError::NotFound(format!("Format {} not found on asset {}", format_id, asset_id));
    state
        .assets()
        .get_format(format_id)
        .await?
        .filter(|f| f.asset_id == asset_id)
        .ok_or_else(not_found)?;

    if !state.assets().delete_format(format_id).await? {
        return Err(not_found().into());
    }
    state.resolver.reconcile(asset_id).await?;

    tracing::info!("Format deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Recompute the preferred viewer format
///
/// Needed after the download allow-list changes or after formats were edited
/// outside the API.
#[utoipa::path(
    post,
    path = "/api/v0/assets/{asset_id}/reconcile",
    tag = "assets",
    params(
        ("asset_id" = i64, Path, description = "Asset ID"),
        ("x-owner-id" = Uuid, Header, description = "Asset owner")
    ),
    responses(
        (status = 200, description = "Viewer choice", body = Object),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn reconcile_asset(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Path(asset_id): Path<AssetId>,
) -> Result<impl IntoResponse, HttpAppError> {
    owned_asset(state.assets().as_ref(), asset_id, owner).await?;
    let choice = state.resolver.reconcile(asset_id).await?;
    Ok(Json(choice))
}
