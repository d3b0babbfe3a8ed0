//! OpenAPI documentation, served at `/api/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use meshdepot_core::models;
use meshdepot_services::{bundler, ingest, resolver};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Meshdepot API",
        version = "0.1.0",
        description = "3D model hosting API (v0): batch uploads of glTF, GLB, OBJ, FBX and Tilt models, background ingestion, preferred-viewer resolution and CORS-aware download bundles. All endpoints are versioned under /api/v0/."
    ),
    paths(
        // Uploads
        handlers::uploads::upload_asset,
        handlers::jobs::get_upload_job,
        // Assets
        handlers::assets::get_asset,
        handlers::assets::finalize_asset,
        handlers::assets::get_downloads,
        handlers::assets::set_viewer_override,
        handlers::assets::delete_format,
        handlers::assets::reconcile_asset,
        handlers::viewer::get_viewer,
    ),
    components(
        schemas(
            error::ErrorResponse,
            handlers::uploads::UploadAccepted,
            handlers::jobs::UploadJobResponse,
            handlers::assets::AssetResponse,
            handlers::assets::FormatResponse,
            handlers::assets::ResourceResponse,
            handlers::assets::ViewerOverrideRequest,
            ingest::FinalizeRequest,
            ingest::FormatFinalize,
            ingest::IngestReport,
            resolver::ViewerTarget,
            bundler::DownloadEntry,
            bundler::Remediation,
            models::JobStatus,
            models::AssetStatus,
            models::License,
            models::FormatType,
            models::Role,
        )
    ),
    tags(
        (name = "uploads", description = "Batch uploads and ingestion job status"),
        (name = "assets", description = "Assets, viewer selection and downloads"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_versioned_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v0/assets/uploads",
            "/api/v0/uploads/{job_id}",
            "/api/v0/assets/{asset_id}/viewer",
            "/api/v0/assets/{asset_id}/downloads",
            "/api/v0/assets/{asset_id}/formats/{format_id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
