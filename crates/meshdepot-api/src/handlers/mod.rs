//! HTTP request handlers, one module per resource.

pub mod assets;
pub mod files;
pub mod jobs;
pub mod owner;
pub mod uploads;
pub mod viewer;
