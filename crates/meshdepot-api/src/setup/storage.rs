//! Storage setup and initialization

use anyhow::{Context, Result};
use meshdepot_core::Config;
use meshdepot_services::{create_storage, Storage};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage abstraction...");
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(
        backend = ?storage.backend_type(),
        public_base_url = %storage.public_base_url(),
        "Storage abstraction initialized successfully"
    );
    Ok(storage)
}
