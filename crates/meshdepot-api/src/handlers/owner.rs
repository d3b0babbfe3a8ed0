//! Owner identity extractor.
//!
//! Authentication happens upstream; the gateway forwards the caller's id in
//! the `x-owner-id` header.

use axum::{extract::FromRequestParts, http::request::Parts};
use meshdepot_core::models::{Asset, AssetId};
use meshdepot_core::AppError;
use meshdepot_db::AssetStore;
use uuid::Uuid;

use crate::constants::OWNER_HEADER;
use crate::error::HttpAppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub Uuid);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", OWNER_HEADER)))?;
        let raw = raw
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("Invalid {} header", OWNER_HEADER)))?;
        let owner = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::BadRequest(format!("{} must be a UUID", OWNER_HEADER)))?;
        Ok(OwnerId(owner))
    }
}

/// Load an asset the caller owns. Assets of other owners read as missing.
pub async fn owned_asset(
    store: &dyn AssetStore,
    asset_id: AssetId,
    owner: OwnerId,
) -> Result<Asset, AppError> {
    store
        .get_asset(asset_id)
        .await?
        .filter(|asset| asset.owner_id == owner.0)
        .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))
}
