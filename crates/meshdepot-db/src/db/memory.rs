//! In-process stores with the same semantics as the PostgreSQL repositories.
//!
//! Used by tests and by `DATABASE_URL=memory://` runs. Every operation takes a
//! single lock, which gives the same all-or-nothing behaviour as the
//! transactions in the SQL implementations.

use async_trait::async_trait;
use chrono::Utc;
use meshdepot_core::models::{
    Asset, AssetId, AssetStatus, Format, FormatId, FormatState, JobStatus, NewAsset, NewFormat,
    NewResource, Resource, ResourceId, StoredFile, UploadJob,
};
use meshdepot_core::{AppError, IdGenerator, IntegrityError};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{AssetStore, FormatMetadataUpdate, UploadJobStore};

/// A Format without its resources, plus the root pointer as stored in the table.
#[derive(Debug, Clone)]
struct FormatRecord {
    format: Format,
    root_resource_id: Option<ResourceId>,
}

#[derive(Default)]
struct State {
    assets: BTreeMap<AssetId, Asset>,
    formats: BTreeMap<FormatId, FormatRecord>,
    resources: BTreeMap<ResourceId, Resource>,
}

impl State {
    fn asset_mut(&mut self, asset_id: AssetId) -> Result<&mut Asset, AppError> {
        self.assets
            .get_mut(&asset_id)
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))
    }

    fn assemble(&self, record: &FormatRecord) -> Format {
        let root = record
            .root_resource_id
            .and_then(|id| self.resources.get(&id).cloned());
        let attached = self
            .resources
            .values()
            .filter(|r| r.format_id == Some(record.format.id))
            .cloned()
            .collect();

        let mut format = record.format.clone();
        format.state = FormatState::from_parts(root, attached);
        format
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct MemoryAssetStore {
    state: Arc<Mutex<State>>,
    ids: Arc<IdGenerator>,
}

impl MemoryAssetStore {
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ids,
        }
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn create_asset(&self, new: NewAsset) -> Result<Asset, AppError> {
        let now = Utc::now();
        let asset = Asset {
            id: self.ids.next_id(),
            owner_id: new.owner_id,
            name: new.name,
            description: new.description,
            license: new.license,
            status: AssetStatus::Uploading,
            is_blocks_origin: new.is_blocks_origin,
            thumbnail: None,
            preferred_viewer_override_id: None,
            preferred_viewer_format_id: None,
            is_viewer_compatible: false,
            upload_manifest: None,
            created_at: now,
            updated_at: now,
        };
        lock(&self.state).assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn get_asset(&self, asset_id: AssetId) -> Result<Option<Asset>, AppError> {
        Ok(lock(&self.state).assets.get(&asset_id).cloned())
    }

    async fn set_asset_name(&self, asset_id: AssetId, name: &str) -> Result<(), AppError> {
        let mut state = lock(&self.state);
        let asset = state.asset_mut(asset_id)?;
        asset.name = name.to_string();
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn set_thumbnail(
        &self,
        asset_id: AssetId,
        thumbnail: StoredFile,
    ) -> Result<(), AppError> {
        let mut state = lock(&self.state);
        let asset = state.asset_mut(asset_id)?;
        asset.thumbnail = Some(thumbnail);
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn set_upload_manifest(
        &self,
        asset_id: AssetId,
        manifest: serde_json::Value,
    ) -> Result<(), AppError> {
        let mut state = lock(&self.state);
        let asset = state.asset_mut(asset_id)?;
        asset.upload_manifest = Some(manifest);
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, asset_id: AssetId, status: AssetStatus) -> Result<(), AppError> {
        let mut state = lock(&self.state);
        let asset = state.asset_mut(asset_id)?;
        asset.status = status;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_complete(&self, asset_id: AssetId) -> Result<bool, AppError> {
        let mut state = lock(&self.state);
        let asset = state.asset_mut(asset_id)?;
        if asset.status != AssetStatus::Uploading {
            return Ok(false);
        }
        asset.status = AssetStatus::Complete;
        asset.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_viewer_override(
        &self,
        asset_id: AssetId,
        format_id: Option<FormatId>,
    ) -> Result<(), AppError> {
        let mut state = lock(&self.state);
        let asset = state.asset_mut(asset_id)?;
        asset.preferred_viewer_override_id = format_id;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn set_viewer_preference(
        &self,
        asset_id: AssetId,
        preferred: Option<FormatId>,
        is_viewer_compatible: bool,
    ) -> Result<(), AppError> {
        let mut state = lock(&self.state);
        let asset = state.asset_mut(asset_id)?;
        asset.preferred_viewer_format_id = preferred;
        asset.is_viewer_compatible = is_viewer_compatible;
        asset.updated_at = Utc::now();

        for record in state
            .formats
            .values_mut()
            .filter(|r| r.format.asset_id == asset_id)
        {
            record.format.is_preferred_for_viewer = Some(record.format.id) == preferred;
        }
        Ok(())
    }

    async fn create_format(&self, new: NewFormat) -> Result<Format, AppError> {
        let mut state = lock(&self.state);
        if !state.assets.contains_key(&new.asset_id) {
            return Err(AppError::NotFound(format!(
                "Asset {} not found",
                new.asset_id
            )));
        }

        let format = Format {
            id: self.ids.next_id(),
            asset_id: new.asset_id,
            format_type: new.format_type,
            role: new.role,
            archive_url: new.archive_url,
            state: FormatState::default(),
            is_preferred_for_viewer: false,
            is_preferred_for_download: false,
            triangle_count: None,
            lineage_id: None,
            created_at: Utc::now(),
        };
        state.formats.insert(
            format.id,
            FormatRecord {
                format: format.clone(),
                root_resource_id: None,
            },
        );
        Ok(format)
    }

    async fn get_format(&self, format_id: FormatId) -> Result<Option<Format>, AppError> {
        let state = lock(&self.state);
        Ok(state.formats.get(&format_id).map(|r| state.assemble(r)))
    }

    async fn list_formats(&self, asset_id: AssetId) -> Result<Vec<Format>, AppError> {
        let state = lock(&self.state);
        Ok(state
            .formats
            .values()
            .filter(|r| r.format.asset_id == asset_id)
            .map(|r| state.assemble(r))
            .collect())
    }

    async fn update_format_metadata(
        &self,
        format_id: FormatId,
        update: FormatMetadataUpdate,
    ) -> Result<(), AppError> {
        let mut state = lock(&self.state);
        let record = state
            .formats
            .get_mut(&format_id)
            .ok_or_else(|| AppError::NotFound(format!("Format {} not found", format_id)))?;

        let format = &mut record.format;
        if let Some(count) = update.triangle_count {
            format.triangle_count = Some(count);
        }
        if let Some(lineage) = update.lineage_id {
            format.lineage_id = Some(lineage);
        }
        if let Some(preferred) = update.is_preferred_for_download {
            format.is_preferred_for_download = preferred;
        }
        Ok(())
    }

    async fn delete_format(&self, format_id: FormatId) -> Result<bool, AppError> {
        let mut state = lock(&self.state);
        let Some(record) = state.formats.remove(&format_id) else {
            return Ok(false);
        };

        if let Some(root_id) = record.root_resource_id {
            state.resources.remove(&root_id);
        }
        state.resources.retain(|_, r| r.format_id != Some(format_id));

        for asset in state.assets.values_mut() {
            if asset.preferred_viewer_override_id == Some(format_id) {
                asset.preferred_viewer_override_id = None;
            }
        }
        Ok(true)
    }

    async fn create_resource(&self, new: NewResource) -> Result<Resource, AppError> {
        let mut state = lock(&self.state);
        if !state.assets.contains_key(&new.asset_id) {
            return Err(AppError::NotFound(format!(
                "Asset {} not found",
                new.asset_id
            )));
        }
        if let Some(format_id) = new.format_id {
            if !state.formats.contains_key(&format_id) {
                return Err(AppError::NotFound(format!("Format {} not found", format_id)));
            }
        }

        let resource = Resource {
            id: self.ids.next_id(),
            asset_id: new.asset_id,
            format_id: new.format_id,
            file: new.file,
            external_url: new.external_url,
            file_name: new.file_name,
            content_type: new.content_type,
            created_at: Utc::now(),
        };
        state.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn promote_root(
        &self,
        format_id: FormatId,
        resource_id: ResourceId,
    ) -> Result<(), AppError> {
        let mut state = lock(&self.state);

        let attached = state
            .resources
            .get(&resource_id)
            .is_some_and(|r| r.format_id == Some(format_id));
        if !attached {
            return Err(IntegrityError::ResourceNotAttached {
                resource_id,
                format_id,
            }
            .into());
        }

        let record = state
            .formats
            .get_mut(&format_id)
            .ok_or_else(|| AppError::NotFound(format!("Format {} not found", format_id)))?;
        if record.root_resource_id.is_some() {
            return Err(IntegrityError::RootAlreadyAssigned { format_id }.into());
        }
        record.root_resource_id = Some(resource_id);

        if let Some(resource) = state.resources.get_mut(&resource_id) {
            resource.format_id = None;
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryUploadJobStore {
    jobs: Arc<Mutex<HashMap<Uuid, UploadJob>>>,
}

impl MemoryUploadJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, job_id: Uuid, apply: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut UploadJob),
    {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("Upload job {} not found", job_id)))?;
        apply(job);
        Ok(())
    }
}

#[async_trait]
impl UploadJobStore for MemoryUploadJobStore {
    async fn create_job(&self, job: &UploadJob) -> Result<(), AppError> {
        let mut jobs = lock(&self.jobs);
        let busy = jobs
            .values()
            .any(|j| j.asset_id == job.asset_id && j.status.is_active());
        if busy && job.status.is_active() {
            return Err(AppError::Conflict(format!(
                "Asset {} already has an upload in progress",
                job.asset_id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<UploadJob>, AppError> {
        Ok(lock(&self.jobs).get(&job_id).cloned())
    }

    async fn active_job_for_asset(
        &self,
        asset_id: AssetId,
    ) -> Result<Option<UploadJob>, AppError> {
        Ok(lock(&self.jobs)
            .values()
            .find(|j| j.asset_id == asset_id && j.status.is_active())
            .cloned())
    }

    async fn mark_running(&self, job_id: Uuid) -> Result<(), AppError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
        })
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        report: serde_json::Value,
    ) -> Result<(), AppError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.report = Some(report);
            job.error = None;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), AppError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.report = None;
            job.error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshdepot_core::models::{FormatType, Role};

    fn store() -> MemoryAssetStore {
        MemoryAssetStore::new(Arc::new(IdGenerator::new(1)))
    }

    async fn format_with_resources(
        store: &MemoryAssetStore,
        names: &[&str],
    ) -> (Asset, Format, Vec<Resource>) {
        let asset = store
            .create_asset(NewAsset::untitled(Uuid::new_v4()))
            .await
            .unwrap();
        let format = store
            .create_format(NewFormat {
                asset_id: asset.id,
                format_type: FormatType::Obj,
                role: Role::UserSubmitted,
                archive_url: None,
            })
            .await
            .unwrap();

        let mut resources = Vec::new();
        for name in names {
            let resource = store
                .create_resource(NewResource {
                    asset_id: asset.id,
                    format_id: Some(format.id),
                    file: Some(StoredFile {
                        key: format!("assets/{}/{}", asset.id, name),
                        url: format!("http://files/assets/{}/{}", asset.id, name),
                    }),
                    external_url: None,
                    file_name: name.to_string(),
                    content_type: None,
                })
                .await
                .unwrap();
            resources.push(resource);
        }
        (asset, format, resources)
    }

    #[tokio::test]
    async fn test_promote_root_moves_resource_out_of_collection() {
        let store = store();
        let (_, format, resources) =
            format_with_resources(&store, &["model.obj", "model.mtl"]).await;

        store.promote_root(format.id, resources[0].id).await.unwrap();

        let loaded = store.get_format(format.id).await.unwrap().unwrap();
        assert_eq!(loaded.root().unwrap().id, resources[0].id);
        assert_eq!(loaded.root().unwrap().format_id, None);
        let extras: Vec<_> = loaded.state.resources().iter().map(|r| r.id).collect();
        assert_eq!(extras, vec![resources[1].id]);
    }

    #[tokio::test]
    async fn test_promote_root_rejects_second_root() {
        let store = store();
        let (_, format, resources) =
            format_with_resources(&store, &["model.obj", "model.mtl"]).await;

        store.promote_root(format.id, resources[0].id).await.unwrap();
        let err = store
            .promote_root(format.id, resources[1].id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Integrity(IntegrityError::RootAlreadyAssigned { .. })
        ));

        // The failed promotion leaves the resource attached.
        let loaded = store.get_format(format.id).await.unwrap().unwrap();
        assert_eq!(loaded.state.resources().len(), 1);
    }

    #[tokio::test]
    async fn test_promote_root_rejects_unattached_resource() {
        let store = store();
        let (_, format, _) = format_with_resources(&store, &["model.obj"]).await;
        let (_, _, foreign) = format_with_resources(&store, &["other.obj"]).await;

        let err = store
            .promote_root(format.id, foreign[0].id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Integrity(IntegrityError::ResourceNotAttached { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_complete_reports_first_transition_only() {
        let store = store();
        let asset = store
            .create_asset(NewAsset::untitled(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(store.mark_complete(asset.id).await.unwrap());
        assert!(!store.mark_complete(asset.id).await.unwrap());
        assert!(matches!(
            store.mark_complete(asset.id + 1).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_complete_leaves_failed_assets_failed() {
        let store = store();
        let asset = store
            .create_asset(NewAsset::untitled(Uuid::new_v4()))
            .await
            .unwrap();
        store.set_status(asset.id, AssetStatus::Failed).await.unwrap();

        assert!(!store.mark_complete(asset.id).await.unwrap());
        let asset = store.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Failed);
    }

    #[tokio::test]
    async fn test_delete_format_removes_root_and_clears_override() {
        let store = store();
        let (asset, format, resources) =
            format_with_resources(&store, &["model.obj", "model.mtl"]).await;
        store.promote_root(format.id, resources[0].id).await.unwrap();
        store
            .set_viewer_override(asset.id, Some(format.id))
            .await
            .unwrap();

        assert!(store.delete_format(format.id).await.unwrap());
        assert!(!store.delete_format(format.id).await.unwrap());

        let asset = store.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(asset.preferred_viewer_override_id, None);
        assert!(store.list_formats(asset.id).await.unwrap().is_empty());
        assert!(lock(&store.state).resources.is_empty());
    }

    #[tokio::test]
    async fn test_viewer_preference_flags_exactly_one_format() {
        let store = store();
        let (asset, first, _) = format_with_resources(&store, &["a.obj"]).await;
        let second = store
            .create_format(NewFormat {
                asset_id: asset.id,
                format_type: FormatType::Glb,
                role: Role::UserSubmitted,
                archive_url: None,
            })
            .await
            .unwrap();

        store
            .set_viewer_preference(asset.id, Some(second.id), true)
            .await
            .unwrap();

        let formats = store.list_formats(asset.id).await.unwrap();
        assert_eq!(formats[0].id, first.id);
        assert!(!formats[0].is_preferred_for_viewer);
        assert!(formats[1].is_preferred_for_viewer);

        let asset = store.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(asset.preferred_viewer_format_id, Some(second.id));
        assert!(asset.is_viewer_compatible);
    }

    #[tokio::test]
    async fn test_only_one_active_job_per_asset() {
        let jobs = MemoryUploadJobStore::new();
        let owner = Uuid::new_v4();
        let first = UploadJob::pending(7, owner);
        jobs.create_job(&first).await.unwrap();

        let second = UploadJob::pending(7, owner);
        assert!(matches!(
            jobs.create_job(&second).await,
            Err(AppError::Conflict(_))
        ));

        jobs.mark_running(first.id).await.unwrap();
        jobs.mark_completed(first.id, serde_json::json!({"formats": 1}))
            .await
            .unwrap();
        assert!(jobs.active_job_for_asset(7).await.unwrap().is_none());
        jobs.create_job(&second).await.unwrap();

        let stored = jobs.get_job(first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.started_at.is_some());
    }
}
