//! Application state shared by every handler.

use meshdepot_core::Config;
use meshdepot_db::{AssetStore, UploadJobStore};
use meshdepot_services::{
    CorsGate, DownloadBundler, IngestionService, Storage, ViewerResolver,
};
use meshdepot_worker::UploadJobQueue;
use sqlx::PgPool;
use std::sync::Arc;

/// Persistence handles. `pool` is `None` when running on the in-memory store.
#[derive(Clone)]
pub struct DbState {
    pub pool: Option<PgPool>,
    pub assets: Arc<dyn AssetStore>,
    pub jobs: Arc<dyn UploadJobStore>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DbState,
    pub storage: Arc<dyn Storage>,
    pub cors_gate: Arc<CorsGate>,
    pub resolver: ViewerResolver,
    pub bundler: DownloadBundler,
    pub ingestion: IngestionService,
    pub upload_queue: UploadJobQueue,
}

impl AppState {
    pub fn assets(&self) -> &Arc<dyn AssetStore> {
        &self.db.assets
    }
}
