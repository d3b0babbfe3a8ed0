//! Service wiring: CORS gate, resolver, bundler, ingestion and the upload queue.

use anyhow::{Context, Result};
use meshdepot_core::Config;
use meshdepot_services::{
    ArchiveUnpacker, CorsGate, DownloadBundler, IngestionService, Storage, ViewerResolver,
};
use meshdepot_worker::{UploadJobQueue, UploadJobQueueConfig};
use std::sync::Arc;

use crate::state::{AppState, DbState};

/// Build the application state. Spawns the upload worker pool, so it must run
/// inside a tokio runtime.
pub fn initialize_services(
    config: &Config,
    db: DbState,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let cors_gate = Arc::new(
        CorsGate::from_config(config, &storage.public_base_url())
            .context("Invalid download CORS configuration")?,
    );
    tracing::info!(
        allowed_hosts = ?cors_gate.allowed_hosts(),
        "Download CORS gate configured"
    );

    let resolver = ViewerResolver::new(db.assets.clone(), cors_gate.clone());
    let bundler = DownloadBundler::new(db.assets.clone(), cors_gate.clone());
    let ingestion = IngestionService::new(
        db.assets.clone(),
        db.jobs.clone(),
        storage.clone(),
        resolver.clone(),
        ArchiveUnpacker::default(),
    );

    let queue_config = UploadJobQueueConfig::from_config(config);
    tracing::info!(
        max_workers = queue_config.max_workers,
        capacity = queue_config.capacity,
        "Starting upload job queue"
    );
    let upload_queue = UploadJobQueue::new(
        db.jobs.clone(),
        Arc::new(ingestion.clone()),
        queue_config,
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        db,
        storage,
        cors_gate,
        resolver,
        bundler,
        ingestion,
        upload_queue,
    }))
}
