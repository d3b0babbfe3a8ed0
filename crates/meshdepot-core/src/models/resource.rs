use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::asset::AssetId;
use super::format::FormatId;

pub type ResourceId = i64;

/// An object held by the platform byte store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoredFile {
    pub key: String,
    pub url: String,
}

/// One file belonging to a Format.
///
/// `format_id` is `None` once the resource has been promoted to its Format's root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub asset_id: AssetId,
    pub format_id: Option<FormatId>,
    pub file: Option<StoredFile>,
    pub external_url: Option<String>,
    pub file_name: String,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// The URL a client should fetch. A platform-stored file wins over an external URL.
    pub fn resolved_url(&self) -> Option<&str> {
        self.file
            .as_ref()
            .map(|f| f.url.as_str())
            .or(self.external_url.as_deref())
    }

    pub fn is_resolvable(&self) -> bool {
        self.resolved_url().is_some()
    }

    /// Lowercased extension of `file_name`, without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct NewResource {
    pub asset_id: AssetId,
    pub format_id: Option<FormatId>,
    pub file: Option<StoredFile>,
    pub external_url: Option<String>,
    pub file_name: String,
    pub content_type: Option<String>,
}
