use async_trait::async_trait;
use chrono::Utc;
use meshdepot_core::models::{
    Asset, AssetId, AssetStatus, Format, FormatId, NewAsset, NewFormat, NewResource, Resource,
    ResourceId, StoredFile,
};
use meshdepot_core::{AppError, IdGenerator, IntegrityError};
use sqlx::{PgPool, Postgres};
use std::sync::Arc;

use super::rows::{AssetRow, FormatRow, ResourceRow};
use super::{AssetStore, FormatMetadataUpdate};

const ASSET_COLUMNS: &str = r#"
    id, owner_id, name, description, license, status, is_blocks_origin,
    thumbnail_key, thumbnail_url, preferred_viewer_override_id,
    preferred_viewer_format_id, is_viewer_compatible, upload_manifest,
    created_at, updated_at
"#;

const FORMAT_COLUMNS: &str = r#"
    id, asset_id, format_type, role, archive_url, root_resource_id,
    is_preferred_for_viewer, is_preferred_for_download, triangle_count,
    lineage_id, created_at
"#;

const RESOURCE_COLUMNS: &str = r#"
    id, asset_id, format_id, file_key, file_url, external_url, file_name,
    content_type, created_at
"#;

#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
    ids: Arc<IdGenerator>,
}

impl AssetRepository {
    pub fn new(pool: PgPool, ids: Arc<IdGenerator>) -> Self {
        Self { pool, ids }
    }

    async fn resources_for_asset(&self, asset_id: AssetId) -> Result<Vec<Resource>, AppError> {
        let rows = sqlx::query_as::<Postgres, ResourceRow>(&format!(
            "SELECT {} FROM resources WHERE asset_id = $1 ORDER BY id ASC",
            RESOURCE_COLUMNS
        ))
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Resource::from).collect())
    }

    fn ensure_asset_updated(asset_id: AssetId, rows_affected: u64) -> Result<(), AppError> {
        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("Asset {} not found", asset_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStore for AssetRepository {
    #[tracing::instrument(skip(self, new), fields(db.table = "assets", db.operation = "insert"))]
    async fn create_asset(&self, new: NewAsset) -> Result<Asset, AppError> {
        let id = self.ids.next_id();
        let row = sqlx::query_as::<Postgres, AssetRow>(&format!(
            r#"
            INSERT INTO assets (id, owner_id, name, description, license, status, is_blocks_origin)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(new.owner_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.license.map(|l| l.as_str()))
        .bind(AssetStatus::Uploading.to_string())
        .bind(new.is_blocks_origin)
        .fetch_one(&self.pool)
        .await?;

        Asset::try_from(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "select", db.record_id = %asset_id))]
    async fn get_asset(&self, asset_id: AssetId) -> Result<Option<Asset>, AppError> {
        let row = sqlx::query_as::<Postgres, AssetRow>(&format!(
            "SELECT {} FROM assets WHERE id = $1",
            ASSET_COLUMNS
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Asset::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "update", db.record_id = %asset_id))]
    async fn set_asset_name(&self, asset_id: AssetId, name: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE assets SET name = $2, updated_at = $3 WHERE id = $1")
            .bind(asset_id)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Self::ensure_asset_updated(asset_id, result.rows_affected())
    }

    #[tracing::instrument(skip(self, thumbnail), fields(db.table = "assets", db.operation = "update", db.record_id = %asset_id))]
    async fn set_thumbnail(
        &self,
        asset_id: AssetId,
        thumbnail: StoredFile,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE assets SET thumbnail_key = $2, thumbnail_url = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(asset_id)
        .bind(&thumbnail.key)
        .bind(&thumbnail.url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Self::ensure_asset_updated(asset_id, result.rows_affected())
    }

    #[tracing::instrument(skip(self, manifest), fields(db.table = "assets", db.operation = "update", db.record_id = %asset_id))]
    async fn set_upload_manifest(
        &self,
        asset_id: AssetId,
        manifest: serde_json::Value,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE assets SET upload_manifest = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(asset_id)
        .bind(manifest)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Self::ensure_asset_updated(asset_id, result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "update", db.record_id = %asset_id))]
    async fn set_status(&self, asset_id: AssetId, status: AssetStatus) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE assets SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(asset_id)
            .bind(status.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Self::ensure_asset_updated(asset_id, result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "update", db.record_id = %asset_id))]
    async fn mark_complete(&self, asset_id: AssetId) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE assets SET status = 'complete', updated_at = $2 WHERE id = $1 AND status = 'uploading'",
        )
        .bind(asset_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.get_asset(asset_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Asset {} not found", asset_id)));
        }
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "update", db.record_id = %asset_id))]
    async fn set_viewer_override(
        &self,
        asset_id: AssetId,
        format_id: Option<FormatId>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE assets SET preferred_viewer_override_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(asset_id)
        .bind(format_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Self::ensure_asset_updated(asset_id, result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "formats", db.operation = "update", db.record_id = %asset_id))]
    async fn set_viewer_preference(
        &self,
        asset_id: AssetId,
        preferred: Option<FormatId>,
        is_viewer_compatible: bool,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE formats SET is_preferred_for_viewer = COALESCE(id = $2, FALSE) WHERE asset_id = $1",
        )
        .bind(asset_id)
        .bind(preferred)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE assets
            SET preferred_viewer_format_id = $2, is_viewer_compatible = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(asset_id)
        .bind(preferred)
        .bind(is_viewer_compatible)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!("Asset {} not found", asset_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, new), fields(db.table = "formats", db.operation = "insert"))]
    async fn create_format(&self, new: NewFormat) -> Result<Format, AppError> {
        let id = self.ids.next_id();
        let row = sqlx::query_as::<Postgres, FormatRow>(&format!(
            r#"
            INSERT INTO formats (id, asset_id, format_type, role, archive_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            FORMAT_COLUMNS
        ))
        .bind(id)
        .bind(new.asset_id)
        .bind(new.format_type.as_str())
        .bind(new.role.as_str())
        .bind(&new.archive_url)
        .fetch_one(&self.pool)
        .await?;

        row.into_format(&[])
    }

    #[tracing::instrument(skip(self), fields(db.table = "formats", db.operation = "select", db.record_id = %format_id))]
    async fn get_format(&self, format_id: FormatId) -> Result<Option<Format>, AppError> {
        let row = sqlx::query_as::<Postgres, FormatRow>(&format!(
            "SELECT {} FROM formats WHERE id = $1",
            FORMAT_COLUMNS
        ))
        .bind(format_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let resources = sqlx::query_as::<Postgres, ResourceRow>(&format!(
            r#"
            SELECT {} FROM resources
            WHERE format_id = $1 OR id = (SELECT root_resource_id FROM formats WHERE id = $1)
            ORDER BY id ASC
            "#,
            RESOURCE_COLUMNS
        ))
        .bind(format_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Resource::from)
        .collect::<Vec<_>>();

        row.into_format(&resources).map(Some)
    }

    #[tracing::instrument(skip(self), fields(db.table = "formats", db.operation = "select", db.record_id = %asset_id))]
    async fn list_formats(&self, asset_id: AssetId) -> Result<Vec<Format>, AppError> {
        let rows = sqlx::query_as::<Postgres, FormatRow>(&format!(
            "SELECT {} FROM formats WHERE asset_id = $1 ORDER BY id ASC",
            FORMAT_COLUMNS
        ))
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let resources = self.resources_for_asset(asset_id).await?;
        rows.into_iter()
            .map(|row| row.into_format(&resources))
            .collect()
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "formats", db.operation = "update", db.record_id = %format_id))]
    async fn update_format_metadata(
        &self,
        format_id: FormatId,
        update: FormatMetadataUpdate,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE formats
            SET triangle_count = COALESCE($2, triangle_count),
                lineage_id = COALESCE($3, lineage_id),
                is_preferred_for_download = COALESCE($4, is_preferred_for_download)
            WHERE id = $1
            "#,
        )
        .bind(format_id)
        .bind(update.triangle_count)
        .bind(&update.lineage_id)
        .bind(update.is_preferred_for_download)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Format {} not found", format_id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "formats", db.operation = "delete", db.record_id = %format_id))]
    async fn delete_format(&self, format_id: FormatId) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let root_id: Option<Option<i64>> =
            sqlx::query_scalar("SELECT root_resource_id FROM formats WHERE id = $1 FOR UPDATE")
                .bind(format_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(root_id) = root_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            "UPDATE assets SET preferred_viewer_override_id = NULL WHERE preferred_viewer_override_id = $1",
        )
        .bind(format_id)
        .execute(&mut *tx)
        .await?;

        // Attached resources cascade; the root is detached and must go explicitly.
        sqlx::query("DELETE FROM formats WHERE id = $1")
            .bind(format_id)
            .execute(&mut *tx)
            .await?;

        if let Some(root_id) = root_id {
            sqlx::query("DELETE FROM resources WHERE id = $1")
                .bind(root_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, new), fields(db.table = "resources", db.operation = "insert"))]
    async fn create_resource(&self, new: NewResource) -> Result<Resource, AppError> {
        let id = self.ids.next_id();
        let (file_key, file_url) = match new.file {
            Some(StoredFile { key, url }) => (Some(key), Some(url)),
            None => (None, None),
        };

        let row = sqlx::query_as::<Postgres, ResourceRow>(&format!(
            r#"
            INSERT INTO resources (id, asset_id, format_id, file_key, file_url, external_url, file_name, content_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            RESOURCE_COLUMNS
        ))
        .bind(id)
        .bind(new.asset_id)
        .bind(new.format_id)
        .bind(file_key)
        .bind(file_url)
        .bind(&new.external_url)
        .bind(&new.file_name)
        .bind(&new.content_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(Resource::from(row))
    }

    #[tracing::instrument(skip(self), fields(db.table = "formats", db.operation = "update", db.record_id = %format_id))]
    async fn promote_root(
        &self,
        format_id: FormatId,
        resource_id: ResourceId,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let detached = sqlx::query(
            "UPDATE resources SET format_id = NULL WHERE id = $1 AND format_id = $2",
        )
        .bind(resource_id)
        .bind(format_id)
        .execute(&mut *tx)
        .await?;

        if detached.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(IntegrityError::ResourceNotAttached {
                resource_id,
                format_id,
            }
            .into());
        }

        let promoted = sqlx::query(
            "UPDATE formats SET root_resource_id = $1 WHERE id = $2 AND root_resource_id IS NULL",
        )
        .bind(resource_id)
        .bind(format_id)
        .execute(&mut *tx)
        .await?;

        if promoted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(IntegrityError::RootAlreadyAssigned { format_id }.into());
        }

        tx.commit().await?;
        Ok(())
    }
}
