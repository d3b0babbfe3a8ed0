//! Meshdepot Core Library
//!
//! Domain models, error types, configuration and id generation shared by every
//! meshdepot component.

pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, MeshdepotConfig};
pub use error::{AppError, ErrorMetadata, IntegrityError, LogLevel};
pub use ids::IdGenerator;
pub use storage_types::StorageBackend;
