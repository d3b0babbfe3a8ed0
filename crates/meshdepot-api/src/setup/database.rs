//! Database setup and initialization

use anyhow::{Context, Result};
use meshdepot_core::{Config, IdGenerator};
use meshdepot_db::{
    AssetRepository, AssetStore, MemoryAssetStore, MemoryUploadJobStore, UploadJobRepository,
    UploadJobStore,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::state::DbState;

/// Connect the configured store. `memory://` skips Postgres entirely.
pub async fn setup_database(config: &Config) -> Result<DbState> {
    let ids = Arc::new(IdGenerator::new(config.id_generator_id()));

    if config.uses_memory_store() {
        tracing::warn!("Using the in-memory asset store; data is lost on restart");
        let assets: Arc<dyn AssetStore> = Arc::new(MemoryAssetStore::new(ids));
        let jobs: Arc<dyn UploadJobStore> = Arc::new(MemoryUploadJobStore::new());
        return Ok(DbState {
            pool: None,
            assets,
            jobs,
        });
    }

    let pool = connect(config).await?;
    let assets: Arc<dyn AssetStore> = Arc::new(AssetRepository::new(pool.clone(), ids));
    let jobs: Arc<dyn UploadJobStore> = Arc::new(UploadJobRepository::new(pool.clone()));
    Ok(DbState {
        pool: Some(pool),
        assets,
        jobs,
    })
}

/// Setup database connection pool and run migrations
async fn connect(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.database_url())
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    // Workspace migrations/ relative to this crate
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
