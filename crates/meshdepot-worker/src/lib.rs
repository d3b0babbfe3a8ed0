//! Background ingestion of upload batches.
//!
//! Uploads are accepted by the API, recorded as pending jobs and handed to the
//! `UploadJobQueue`, which runs them on a bounded pool of tokio tasks.

pub mod handler;
pub mod queue;

pub use handler::UploadJobHandler;
pub use queue::{UploadJobQueue, UploadJobQueueConfig};
