//! Meshdepot persistence: asset, format, resource and upload job repositories.

pub mod db;

pub use db::{
    AssetRepository, AssetStore, FormatMetadataUpdate, MemoryAssetStore, MemoryUploadJobStore,
    UploadJobRepository, UploadJobStore,
};
