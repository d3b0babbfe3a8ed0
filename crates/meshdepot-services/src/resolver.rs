//! Preferred-viewer resolution.
//!
//! `resolve` is a pure function of the asset, its Formats and the CORS gate.
//! `ViewerResolver::reconcile` persists the outcome into the denormalized asset
//! and Format columns, writing only when the outcome changed.

use meshdepot_core::models::{Asset, AssetId, Format, FormatId, FormatType};
use meshdepot_core::AppError;
use meshdepot_db::AssetStore;
use meshdepot_processing::content_type_for;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::cors::CorsGate;

/// Viewer preference among Formats with a fetch-safe root, best first.
pub const VIEWER_RANKING: [FormatType; 12] = [
    FormatType::Glb,
    FormatType::Gltf2,
    FormatType::Gltf1,
    FormatType::Obj,
    FormatType::Ksplat,
    FormatType::Ply,
    FormatType::Stl,
    FormatType::Sog,
    FormatType::Spz,
    FormatType::Splat,
    FormatType::Usdz,
    FormatType::Vox,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "format_id", rename_all = "snake_case")]
pub enum ViewerChoice {
    Override(FormatId),
    BlocksOrigin(FormatId),
    Ranked(FormatId),
    NotCompatible,
}

impl ViewerChoice {
    pub fn format_id(&self) -> Option<FormatId> {
        match self {
            ViewerChoice::Override(id) | ViewerChoice::BlocksOrigin(id) | ViewerChoice::Ranked(id) => {
                Some(*id)
            }
            ViewerChoice::NotCompatible => None,
        }
    }

    pub fn is_viewer_compatible(&self) -> bool {
        self.format_id().is_some()
    }
}

fn has_resolvable_root(format: &Format) -> bool {
    format.root().is_some_and(|root| root.is_resolvable())
}

/// First Format of `format_type` (lowest id) matching `accept`.
fn first_of<'a>(
    formats: &'a [Format],
    format_type: FormatType,
    accept: impl Fn(&Format) -> bool,
) -> Option<&'a Format> {
    formats
        .iter()
        .filter(|f| f.format_type == format_type && accept(f))
        .min_by_key(|f| f.id)
}

pub fn resolve(asset: &Asset, formats: &[Format], gate: &CorsGate) -> ViewerChoice {
    if let Some(override_id) = asset.preferred_viewer_override_id {
        if let Some(format) = formats.iter().find(|f| f.id == override_id) {
            if has_resolvable_root(format) {
                return ViewerChoice::Override(format.id);
            }
        }
    }

    if asset.is_blocks_origin {
        // The OBJ root must be the mesh, not its material library.
        let obj = first_of(formats, FormatType::Obj, |f| {
            has_resolvable_root(f)
                && f.root().and_then(|r| r.extension()).as_deref() != Some("mtl")
        });
        let fallback = || first_of(formats, FormatType::Gltf2, has_resolvable_root);
        if let Some(format) = obj.or_else(fallback) {
            return ViewerChoice::BlocksOrigin(format.id);
        }
    }

    formats
        .iter()
        .filter(|f| {
            f.root()
                .is_some_and(|root| root.is_resolvable() && gate.is_fetch_safe(root))
        })
        .filter_map(|f| {
            VIEWER_RANKING
                .iter()
                .position(|t| *t == f.format_type)
                .map(|rank| (rank, f.id))
        })
        .min()
        .map(|(_, id)| ViewerChoice::Ranked(id))
        .unwrap_or(ViewerChoice::NotCompatible)
}

/// What the embedded viewer should load for an asset.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ViewerTarget {
    pub format_id: FormatId,
    pub format_type: FormatType,
    pub url: String,
    pub content_type: String,
}

#[derive(Clone)]
pub struct ViewerResolver {
    store: Arc<dyn AssetStore>,
    gate: Arc<CorsGate>,
}

impl ViewerResolver {
    pub fn new(store: Arc<dyn AssetStore>, gate: Arc<CorsGate>) -> Self {
        Self { store, gate }
    }

    async fn load(&self, asset_id: AssetId) -> Result<(Asset, Vec<Format>), AppError> {
        let asset = self
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;
        let formats = self.store.list_formats(asset_id).await?;
        Ok((asset, formats))
    }

    /// Recompute the preferred viewer Format and persist it if it changed.
    #[tracing::instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn reconcile(&self, asset_id: AssetId) -> Result<ViewerChoice, AppError> {
        let (asset, formats) = self.load(asset_id).await?;
        let choice = resolve(&asset, &formats, &self.gate);
        let preferred = choice.format_id();

        let unchanged = asset.preferred_viewer_format_id == preferred
            && asset.is_viewer_compatible == choice.is_viewer_compatible()
            && formats
                .iter()
                .all(|f| f.is_preferred_for_viewer == (Some(f.id) == preferred));

        if unchanged {
            tracing::debug!(?choice, "Viewer preference unchanged");
            return Ok(choice);
        }

        self.store
            .set_viewer_preference(asset_id, preferred, choice.is_viewer_compatible())
            .await?;

        tracing::info!(
            ?choice,
            previous = ?asset.preferred_viewer_format_id,
            "Viewer preference updated"
        );
        Ok(choice)
    }

    /// The cached preferred Format's root, or `None` when the asset is not
    /// viewer compatible.
    pub async fn viewer_target(&self, asset_id: AssetId) -> Result<Option<ViewerTarget>, AppError> {
        let (asset, formats) = self.load(asset_id).await?;
        if !asset.is_viewer_compatible {
            return Ok(None);
        }
        let Some(preferred) = asset.preferred_viewer_format_id else {
            return Ok(None);
        };

        let target = formats
            .iter()
            .find(|f| f.id == preferred)
            .and_then(|format| {
                let root = format.root()?;
                let url = root.resolved_url()?;
                Some(ViewerTarget {
                    format_id: format.id,
                    format_type: format.format_type,
                    url: url.to_string(),
                    content_type: root
                        .content_type
                        .clone()
                        .unwrap_or_else(|| content_type_for(&root.file_name).to_string()),
                })
            });

        if target.is_none() {
            tracing::warn!(
                asset_id = %asset_id,
                format_id = %preferred,
                "Cached viewer preference no longer resolves; reconcile pending"
            );
        }
        Ok(target)
    }
}
