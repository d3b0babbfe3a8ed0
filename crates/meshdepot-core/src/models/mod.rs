pub mod asset;
pub mod format;
pub mod resource;
pub mod upload_job;

pub use asset::{Asset, AssetId, AssetStatus, License, NewAsset};
pub use format::{Format, FormatId, FormatState, FormatType, NewFormat, Role};
pub use resource::{NewResource, Resource, ResourceId, StoredFile};
pub use upload_job::{JobStatus, UploadJob};
