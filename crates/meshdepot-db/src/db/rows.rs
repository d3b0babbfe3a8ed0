//! Raw table rows and their conversion into domain models.
//!
//! Enum columns are stored as text; a value that fails to parse means the
//! database holds data this build does not understand, reported as internal.

use chrono::{DateTime, Utc};
use meshdepot_core::models::{
    Asset, AssetStatus, Format, FormatState, FormatType, JobStatus, License, Resource, Role,
    StoredFile, UploadJob,
};
use meshdepot_core::AppError;
use uuid::Uuid;

fn parse_column<T: std::str::FromStr<Err = anyhow::Error>>(
    column: &str,
    value: &str,
) -> Result<T, AppError> {
    value.parse::<T>().map_err(|e| {
        AppError::Internal(format!("Unreadable {} column value '{}': {}", column, value, e))
    })
}

fn stored_file(key: Option<String>, url: Option<String>) -> Option<StoredFile> {
    match (key, url) {
        (Some(key), Some(url)) => Some(StoredFile { key, url }),
        _ => None,
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AssetRow {
    pub id: i64,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub license: Option<String>,
    pub status: String,
    pub is_blocks_origin: bool,
    pub thumbnail_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub preferred_viewer_override_id: Option<i64>,
    pub preferred_viewer_format_id: Option<i64>,
    pub is_viewer_compatible: bool,
    pub upload_manifest: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = AppError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        Ok(Asset {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            license: row
                .license
                .as_deref()
                .map(|l| parse_column::<License>("license", l))
                .transpose()?,
            status: parse_column::<AssetStatus>("status", &row.status)?,
            is_blocks_origin: row.is_blocks_origin,
            thumbnail: stored_file(row.thumbnail_key, row.thumbnail_url),
            preferred_viewer_override_id: row.preferred_viewer_override_id,
            preferred_viewer_format_id: row.preferred_viewer_format_id,
            is_viewer_compatible: row.is_viewer_compatible,
            upload_manifest: row.upload_manifest,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct FormatRow {
    pub id: i64,
    pub asset_id: i64,
    pub format_type: String,
    pub role: String,
    pub archive_url: Option<String>,
    pub root_resource_id: Option<i64>,
    pub is_preferred_for_viewer: bool,
    pub is_preferred_for_download: bool,
    pub triangle_count: Option<i64>,
    pub lineage_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FormatRow {
    /// `resources` may contain rows of other Formats of the same asset.
    pub fn into_format(self, resources: &[Resource]) -> Result<Format, AppError> {
        let root = self
            .root_resource_id
            .and_then(|root_id| resources.iter().find(|r| r.id == root_id).cloned());
        let attached: Vec<Resource> = resources
            .iter()
            .filter(|r| r.format_id == Some(self.id))
            .cloned()
            .collect();

        Ok(Format {
            id: self.id,
            asset_id: self.asset_id,
            format_type: parse_column::<FormatType>("format_type", &self.format_type)?,
            role: parse_column::<Role>("role", &self.role)?,
            archive_url: self.archive_url,
            state: FormatState::from_parts(root, attached),
            is_preferred_for_viewer: self.is_preferred_for_viewer,
            is_preferred_for_download: self.is_preferred_for_download,
            triangle_count: self.triangle_count,
            lineage_id: self.lineage_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ResourceRow {
    pub id: i64,
    pub asset_id: i64,
    pub format_id: Option<i64>,
    pub file_key: Option<String>,
    pub file_url: Option<String>,
    pub external_url: Option<String>,
    pub file_name: String,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Resource {
            id: row.id,
            asset_id: row.asset_id,
            format_id: row.format_id,
            file: stored_file(row.file_key, row.file_url),
            external_url: row.external_url,
            file_name: row.file_name,
            content_type: row.content_type,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct UploadJobRow {
    pub id: Uuid,
    pub asset_id: i64,
    pub owner_id: Uuid,
    pub status: String,
    pub report: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<UploadJobRow> for UploadJob {
    type Error = AppError;

    fn try_from(row: UploadJobRow) -> Result<Self, Self::Error> {
        Ok(UploadJob {
            id: row.id,
            asset_id: row.asset_id,
            owner_id: row.owner_id,
            status: parse_column::<JobStatus>("status", &row.status)?,
            report: row.report,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}
