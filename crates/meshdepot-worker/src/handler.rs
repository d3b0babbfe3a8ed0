//! Upload job handler trait
//!
//! The queue calls `handle` for every job it runs. The returned JSON report is
//! stored on the completed job; an error becomes the job's failure message.

use anyhow::Result;
use async_trait::async_trait;
use meshdepot_core::models::AssetId;
use meshdepot_services::{IngestionService, UploadItem};

#[async_trait]
pub trait UploadJobHandler: Send + Sync {
    async fn handle(&self, asset_id: AssetId, items: Vec<UploadItem>) -> Result<serde_json::Value>;
}

#[async_trait]
impl UploadJobHandler for IngestionService {
    async fn handle(&self, asset_id: AssetId, items: Vec<UploadItem>) -> Result<serde_json::Value> {
        let report = self.ingest(asset_id, items).await?;
        Ok(serde_json::to_value(report)?)
    }
}
