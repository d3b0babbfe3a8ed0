//! Database repositories for the data access layer
//!
//! `AssetStore` and `UploadJobStore` are the seams the services depend on. Each
//! has a PostgreSQL repository and an in-process implementation (`memory`) used
//! by tests and `DATABASE_URL=memory://` runs.

pub mod asset;
pub mod memory;
pub mod rows;
pub mod upload_job;

pub use asset::AssetRepository;
pub use memory::{MemoryAssetStore, MemoryUploadJobStore};
pub use upload_job::UploadJobRepository;

use async_trait::async_trait;
use meshdepot_core::models::{
    Asset, AssetId, AssetStatus, Format, FormatId, NewAsset, NewFormat, NewResource, Resource,
    ResourceId, StoredFile, UploadJob,
};
use meshdepot_core::AppError;
use uuid::Uuid;

/// Externally computed Format metadata applied at finalize time.
#[derive(Debug, Clone, Default)]
pub struct FormatMetadataUpdate {
    pub triangle_count: Option<i64>,
    pub lineage_id: Option<String>,
    pub is_preferred_for_download: Option<bool>,
}

/// Assets with their Formats and Resources.
///
/// Ids are assigned by the store. Formats are always returned ordered by id with
/// their resource state fully loaded.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create_asset(&self, new: NewAsset) -> Result<Asset, AppError>;

    async fn get_asset(&self, asset_id: AssetId) -> Result<Option<Asset>, AppError>;

    async fn set_asset_name(&self, asset_id: AssetId, name: &str) -> Result<(), AppError>;

    async fn set_thumbnail(&self, asset_id: AssetId, thumbnail: StoredFile)
        -> Result<(), AppError>;

    async fn set_upload_manifest(
        &self,
        asset_id: AssetId,
        manifest: serde_json::Value,
    ) -> Result<(), AppError>;

    async fn set_status(&self, asset_id: AssetId, status: AssetStatus) -> Result<(), AppError>;

    /// Move the asset from `uploading` to `complete`. Returns false when the
    /// asset is already `complete` or `failed`.
    async fn mark_complete(&self, asset_id: AssetId) -> Result<bool, AppError>;

    async fn set_viewer_override(
        &self,
        asset_id: AssetId,
        format_id: Option<FormatId>,
    ) -> Result<(), AppError>;

    /// Write the denormalized viewer choice: the asset columns and every
    /// Format's `is_preferred_for_viewer` flag.
    async fn set_viewer_preference(
        &self,
        asset_id: AssetId,
        preferred: Option<FormatId>,
        is_viewer_compatible: bool,
    ) -> Result<(), AppError>;

    async fn create_format(&self, new: NewFormat) -> Result<Format, AppError>;

    async fn get_format(&self, format_id: FormatId) -> Result<Option<Format>, AppError>;

    async fn list_formats(&self, asset_id: AssetId) -> Result<Vec<Format>, AppError>;

    async fn update_format_metadata(
        &self,
        format_id: FormatId,
        update: FormatMetadataUpdate,
    ) -> Result<(), AppError>;

    /// Delete a Format with its root and resources. Returns false if it did not exist.
    async fn delete_format(&self, format_id: FormatId) -> Result<bool, AppError>;

    async fn create_resource(&self, new: NewResource) -> Result<Resource, AppError>;

    /// Detach a resource from its Format's collection and make it the root.
    ///
    /// Fails with `AppError::Integrity` if the resource is not attached to the
    /// Format or the Format already has a root.
    async fn promote_root(
        &self,
        format_id: FormatId,
        resource_id: ResourceId,
    ) -> Result<(), AppError>;
}

/// Upload job bookkeeping. At most one pending or running job per asset.
#[async_trait]
pub trait UploadJobStore: Send + Sync {
    /// Fails with `AppError::Conflict` if the asset already has an active job.
    async fn create_job(&self, job: &UploadJob) -> Result<(), AppError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<UploadJob>, AppError>;

    async fn active_job_for_asset(&self, asset_id: AssetId)
        -> Result<Option<UploadJob>, AppError>;

    async fn mark_running(&self, job_id: Uuid) -> Result<(), AppError>;

    async fn mark_completed(
        &self,
        job_id: Uuid,
        report: serde_json::Value,
    ) -> Result<(), AppError>;

    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), AppError>;
}
