//! Route configuration and setup.

mod health;

use crate::api_doc::ApiDoc;
use crate::constants::{API_BASE, API_PREFIX};
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{delete, get, post, put},
    Json, Router,
};
use meshdepot_core::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Mount point for objects served from local storage; `LOCAL_STORAGE_BASE_URL`
/// should end with this path.
pub const FILES_ROUTE: &str = "/files";

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assets/uploads", post(handlers::uploads::upload_asset))
        .route("/uploads/{job_id}", get(handlers::jobs::get_upload_job))
        .route("/assets/{asset_id}", get(handlers::assets::get_asset))
        .route(
            "/assets/{asset_id}/finalize",
            post(handlers::assets::finalize_asset),
        )
        .route("/assets/{asset_id}/viewer", get(handlers::viewer::get_viewer))
        .route(
            "/assets/{asset_id}/downloads",
            get(handlers::assets::get_downloads),
        )
        .route(
            "/assets/{asset_id}/viewer-override",
            put(handlers::assets::set_viewer_override),
        )
        .route(
            "/assets/{asset_id}/formats/{format_id}",
            delete(handlers::assets::delete_format),
        )
        .route(
            "/assets/{asset_id}/reconcile",
            post(handlers::assets::reconcile_asset),
        )
}

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;
    let openapi_path = format!("{}/openapi.json", API_BASE);

    let app = Router::new()
        .nest(API_PREFIX, api_routes())
        .route("/health", get(health::health_check))
        .route(&format!("{}/{{*key}}", FILES_ROUTE), get(handlers::files::get_file))
        .route(
            &openapi_path,
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(utoipa_rapidoc::RapiDoc::new(openapi_path.clone()).path("/docs"))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_size_bytes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}
