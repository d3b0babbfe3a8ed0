use async_trait::async_trait;
use chrono::Utc;
use meshdepot_core::models::{AssetId, JobStatus, UploadJob};
use meshdepot_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::rows::UploadJobRow;
use super::UploadJobStore;

const JOB_COLUMNS: &str =
    "id, asset_id, owner_id, status, report, error, created_at, started_at, completed_at";

/// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct UploadJobRepository {
    pool: PgPool,
}

impl UploadJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ensure_job_updated(job_id: Uuid, rows_affected: u64) -> Result<(), AppError> {
        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("Upload job {} not found", job_id)));
        }
        Ok(())
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        report: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = $2, report = $3, error = $4, completed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(status.to_string())
        .bind(report)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Self::ensure_job_updated(job_id, result.rows_affected())
    }
}

#[async_trait]
impl UploadJobStore for UploadJobRepository {
    #[tracing::instrument(skip(self, job), fields(db.table = "upload_jobs", db.operation = "insert", db.record_id = %job.id))]
    async fn create_job(&self, job: &UploadJob) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO upload_jobs (id, asset_id, owner_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(job.asset_id)
        .bind(job.owner_id)
        .bind(job.status.to_string())
        .bind(job.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::Conflict(format!(
                    "Asset {} already has an upload in progress",
                    job.asset_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs", db.operation = "select", db.record_id = %job_id))]
    async fn get_job(&self, job_id: Uuid) -> Result<Option<UploadJob>, AppError> {
        let row = sqlx::query_as::<Postgres, UploadJobRow>(&format!(
            "SELECT {} FROM upload_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UploadJob::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs", db.operation = "select"))]
    async fn active_job_for_asset(
        &self,
        asset_id: AssetId,
    ) -> Result<Option<UploadJob>, AppError> {
        let row = sqlx::query_as::<Postgres, UploadJobRow>(&format!(
            "SELECT {} FROM upload_jobs WHERE asset_id = $1 AND status IN ('pending', 'running')",
            JOB_COLUMNS
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UploadJob::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs", db.operation = "update", db.record_id = %job_id))]
    async fn mark_running(&self, job_id: Uuid) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE upload_jobs SET status = $2, started_at = $3 WHERE id = $1")
                .bind(job_id)
                .bind(JobStatus::Running.to_string())
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        Self::ensure_job_updated(job_id, result.rows_affected())
    }

    #[tracing::instrument(skip(self, report), fields(db.table = "upload_jobs", db.operation = "update", db.record_id = %job_id))]
    async fn mark_completed(
        &self,
        job_id: Uuid,
        report: serde_json::Value,
    ) -> Result<(), AppError> {
        self.finish(job_id, JobStatus::Completed, Some(report), None)
            .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs", db.operation = "update", db.record_id = %job_id))]
    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), AppError> {
        self.finish(job_id, JobStatus::Failed, None, Some(error))
            .await
    }
}
