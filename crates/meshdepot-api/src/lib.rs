//! Meshdepot API Library
//!
//! HTTP handlers, OpenAPI documentation and application setup for the
//! meshdepot service.

mod api_doc;
pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
