//! Meshdepot Services Layer
//!
//! Orchestration on top of processing, storage and the asset store: ingestion
//! of upload batches, the preferred-viewer resolver and the download bundler.
//! The API crate depends on this facade and keeps its handlers thin.

pub mod bundler;
pub mod cors;
pub mod ingest;
pub mod resolver;

pub use bundler::{bundle, DownloadBundler, DownloadEntry, Remediation};
pub use cors::{CorsConfigError, CorsGate};
pub use ingest::{FinalizeRequest, FormatFinalize, IngestError, IngestReport, IngestionService};
pub use meshdepot_processing::{ArchiveUnpacker, UploadItem};
pub use meshdepot_storage::{create_storage, Storage, StorageError, StorageResult};
pub use resolver::{resolve, ViewerChoice, ViewerResolver, ViewerTarget, VIEWER_RANKING};
