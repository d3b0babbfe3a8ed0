//! Upload ingestion and finalize.
//!
//! `ingest` turns one upload batch into Formats and Resources on an existing
//! asset. A single file that fails to reach the byte store is skipped and
//! reported; the batch only fails when no Format survives. `finalize` applies
//! externally computed metadata once and marks the asset complete.

use meshdepot_core::models::{
    AssetId, AssetStatus, FormatId, NewFormat, NewResource, Role, StoredFile,
};
use meshdepot_core::AppError;
use meshdepot_db::{AssetStore, FormatMetadataUpdate, UploadJobStore};
use meshdepot_processing::classify::is_main_file;
use meshdepot_processing::{
    is_archive, plan_formats, ArchiveUnpacker, MatchError, MatchPlan, MatchSummary, SkippedEntry,
    UploadItem,
};
use meshdepot_storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;

use crate::resolver::{ViewerChoice, ViewerResolver};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    NoUsableFiles(#[from] MatchError),

    #[error("No formats could be stored for asset {0}")]
    NothingStored(AssetId),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::NoUsableFiles(e) => AppError::InvalidInput(e.to_string()),
            IngestError::NothingStored(asset_id) => AppError::BadRequest(format!(
                "No formats could be stored for asset {}",
                asset_id
            )),
            IngestError::App(e) => e,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestReport {
    pub asset_id: AssetId,
    pub asset_name: String,
    pub format_ids: Vec<FormatId>,
    pub formats_created: usize,
    pub resources_created: usize,
    /// Archive entries the unpacker could not use.
    #[schema(value_type = Vec<Object>)]
    pub skipped: Vec<SkippedEntry>,
    /// Files that failed to reach the byte store.
    pub failed_uploads: Vec<String>,
    #[schema(value_type = Object)]
    pub unmatched: MatchSummary,
    pub thumbnail: bool,
    pub manifest: bool,
    #[schema(value_type = Object)]
    pub viewer: ViewerChoice,
}

/// Externally computed metadata for one Format.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FormatFinalize {
    pub format_id: FormatId,
    pub triangle_count: Option<i64>,
    pub lineage_id: Option<String>,
    pub is_preferred_for_download: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub formats: Vec<FormatFinalize>,
}

/// Reject batches that can never produce a Format before any work is queued.
///
/// Archives are opaque here; their contents are only checked during ingestion.
pub fn precheck(items: &[UploadItem]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }
    let opaque = items.iter().any(|i| is_archive(&i.file_name));
    if !opaque && !items.iter().any(|i| is_main_file(&i.file_name)) {
        return Err(AppError::InvalidInput(MatchError::NoUsableFiles.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn AssetStore>,
    jobs: Arc<dyn UploadJobStore>,
    storage: Arc<dyn Storage>,
    resolver: ViewerResolver,
    unpacker: ArchiveUnpacker,
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn AssetStore>,
        jobs: Arc<dyn UploadJobStore>,
        storage: Arc<dyn Storage>,
        resolver: ViewerResolver,
        unpacker: ArchiveUnpacker,
    ) -> Self {
        Self {
            store,
            jobs,
            storage,
            resolver,
            unpacker,
        }
    }

    pub fn resolver(&self) -> &ViewerResolver {
        &self.resolver
    }

    async fn store_file(
        &self,
        asset_id: AssetId,
        item: &UploadItem,
        content_type: &str,
    ) -> Option<StoredFile> {
        match self
            .storage
            .upload(asset_id, &item.file_name, content_type, item.data.to_vec())
            .await
        {
            Ok((key, url)) => Some(StoredFile { key, url }),
            Err(e) => {
                tracing::warn!(
                    asset_id = %asset_id,
                    file = %item.file_name,
                    error = %e,
                    "Failed to store uploaded file, skipping"
                );
                None
            }
        }
    }

    /// Create a Format per planned main file whose bytes were stored. Ids of
    /// the Formats created so far are pushed to `format_ids` as they appear.
    async fn persist_formats(
        &self,
        asset_id: AssetId,
        plan: &MatchPlan,
        stored: &[Option<StoredFile>],
        format_ids: &mut Vec<FormatId>,
    ) -> Result<usize, AppError> {
        let mut resources_created = 0;
        for planned in &plan.formats {
            let root_file = &plan.files[planned.root];
            let Some(root_stored) = stored[planned.root].clone() else {
                tracing::warn!(
                    asset_id = %asset_id,
                    file = %root_file.item.file_name,
                    "Main file not stored, dropping format"
                );
                continue;
            };

            let format = self
                .store
                .create_format(NewFormat {
                    asset_id,
                    format_type: planned.format_type,
                    role: Role::UserSubmitted,
                    archive_url: None,
                })
                .await?;
            format_ids.push(format.id);

            let root = self
                .store
                .create_resource(NewResource {
                    asset_id,
                    format_id: Some(format.id),
                    file: Some(root_stored),
                    external_url: None,
                    file_name: root_file.item.file_name.clone(),
                    content_type: Some(root_file.content_type.to_string()),
                })
                .await?;
            self.store.promote_root(format.id, root.id).await?;
            resources_created += 1;

            for &index in &planned.resources {
                let Some(file) = stored[index].clone() else {
                    continue;
                };
                let planned_file = &plan.files[index];
                self.store
                    .create_resource(NewResource {
                        asset_id,
                        format_id: Some(format.id),
                        file: Some(file),
                        external_url: None,
                        file_name: planned_file.item.file_name.clone(),
                        content_type: Some(planned_file.content_type.to_string()),
                    })
                    .await?;
                resources_created += 1;
            }

            tracing::debug!(
                asset_id = %asset_id,
                format_id = %format.id,
                format_type = %planned.format_type,
                "Format created"
            );
        }
        Ok(resources_created)
    }

    /// Best-effort cleanup after a store error mid-ingestion: drop the Formats
    /// this run created and leave the asset `failed`.
    async fn abandon(&self, asset_id: AssetId, format_ids: &[FormatId]) {
        for &format_id in format_ids {
            if let Err(e) = self.store.delete_format(format_id).await {
                tracing::warn!(
                    asset_id = %asset_id,
                    format_id = %format_id,
                    error = %e,
                    "Failed to remove partially ingested format"
                );
            }
        }
        if let Err(e) = self.store.set_status(asset_id, AssetStatus::Failed).await {
            tracing::error!(asset_id = %asset_id, error = %e, "Failed to mark asset failed");
        }
    }

    #[tracing::instrument(skip(self, items), fields(asset_id = %asset_id, items = items.len()))]
    pub async fn ingest(
        &self,
        asset_id: AssetId,
        items: Vec<UploadItem>,
    ) -> Result<IngestReport, IngestError> {
        let start = Instant::now();

        self.store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;

        let unpacker = self.unpacker.clone();
        let unpacked = tokio::task::spawn_blocking(move || unpacker.unpack(items))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to unpack upload: {}", e)))?;

        let plan = match plan_formats(unpacked.files) {
            Ok(plan) => plan,
            Err(e) => {
                self.store.set_status(asset_id, AssetStatus::Failed).await?;
                return Err(e.into());
            }
        };

        let mut failed_uploads = Vec::new();
        let mut stored: Vec<Option<StoredFile>> = Vec::with_capacity(plan.files.len());
        for file in &plan.files {
            let result = self.store_file(asset_id, &file.item, file.content_type).await;
            if result.is_none() {
                failed_uploads.push(file.item.file_name.clone());
            }
            stored.push(result);
        }

        let mut format_ids = Vec::new();
        let resources_created =
            match self.persist_formats(asset_id, &plan, &stored, &mut format_ids).await {
                Ok(count) => count,
                Err(e) => {
                    self.abandon(asset_id, &format_ids).await;
                    return Err(e.into());
                }
            };

        if format_ids.is_empty() {
            self.store.set_status(asset_id, AssetStatus::Failed).await?;
            tracing::error!(asset_id = %asset_id, "No formats survived ingestion");
            return Err(IngestError::NothingStored(asset_id));
        }

        let mut thumbnail = false;
        if let Some(item) = &unpacked.thumbnail {
            let content_type = meshdepot_processing::content_type_for(&item.file_name);
            match self.store_file(asset_id, item, content_type).await {
                Some(file) => {
                    self.store.set_thumbnail(asset_id, file).await?;
                    thumbnail = true;
                }
                None => failed_uploads.push(item.file_name.clone()),
            }
        }

        let manifest = unpacked.manifest.is_some();
        if let Some(value) = unpacked.manifest {
            self.store.set_upload_manifest(asset_id, value).await?;
        }

        self.store.set_asset_name(asset_id, &plan.asset_name).await?;
        let viewer = self.resolver.reconcile(asset_id).await?;

        let report = IngestReport {
            asset_id,
            asset_name: plan.asset_name,
            formats_created: format_ids.len(),
            format_ids,
            resources_created,
            skipped: unpacked.skipped,
            failed_uploads,
            unmatched: plan.summary,
            thumbnail,
            manifest,
            viewer,
        };

        tracing::info!(
            asset_id = %asset_id,
            formats = report.formats_created,
            resources = report.resources_created,
            failed_uploads = report.failed_uploads.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload ingested"
        );

        Ok(report)
    }

    /// Apply final Format metadata and mark the asset complete. Runs once per asset.
    #[tracing::instrument(skip(self, request), fields(asset_id = %asset_id))]
    pub async fn finalize(
        &self,
        asset_id: AssetId,
        request: FinalizeRequest,
    ) -> Result<ViewerChoice, AppError> {
        let asset = self
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;
        match asset.status {
            AssetStatus::Uploading => {}
            AssetStatus::Complete => {
                return Err(AppError::Conflict(format!(
                    "Asset {} is already finalized",
                    asset_id
                )))
            }
            AssetStatus::Failed => {
                return Err(AppError::Conflict(format!(
                    "Asset {} failed ingestion and cannot be finalized",
                    asset_id
                )))
            }
        }
        if let Some(job) = self.jobs.active_job_for_asset(asset_id).await? {
            return Err(AppError::Conflict(format!(
                "Asset {} is still being ingested by job {}",
                asset_id, job.id
            )));
        }

        let owned: HashSet<FormatId> = self
            .store
            .list_formats(asset_id)
            .await?
            .iter()
            .map(|f| f.id)
            .collect();
        if let Some(foreign) = request.formats.iter().find(|u| !owned.contains(&u.format_id)) {
            return Err(AppError::NotFound(format!(
                "Format {} not found on asset {}",
                foreign.format_id, asset_id
            )));
        }

        for update in request.formats {
            self.store
                .update_format_metadata(
                    update.format_id,
                    FormatMetadataUpdate {
                        triangle_count: update.triangle_count,
                        lineage_id: update.lineage_id,
                        is_preferred_for_download: update.is_preferred_for_download,
                    },
                )
                .await?;
        }

        if !self.store.mark_complete(asset_id).await? {
            return Err(AppError::Conflict(format!(
                "Asset {} is no longer uploading",
                asset_id
            )));
        }

        let choice = self.resolver.reconcile(asset_id).await?;
        tracing::info!(asset_id = %asset_id, ?choice, "Asset finalized");
        Ok(choice)
    }
}
