//! Test helpers: build AppState and router for integration tests.
//!
//! Tests run against the in-memory store and local storage in a temp
//! directory, so no database is required.

pub mod fixtures;

use axum_test::TestServer;
use meshdepot_api::constants;
use meshdepot_api::setup::{database, routes, services};
use meshdepot_api::state::AppState;
use meshdepot_core::{BaseConfig, Config, MeshdepotConfig, StorageBackend};
use meshdepot_services::Storage;
use meshdepot_storage::LocalStorage;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const OWNER: &str = "7b0a8c52-3f1e-4d2a-9c61-0d6f4b2e8a15";
pub const OTHER_OWNER: &str = "1e3f5a7c-9b2d-4f6e-8a0c-2d4f6b8a0c1e";
pub const FILES_BASE_URL: &str = "http://localhost:4000/files";

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn create_test_config(storage_path: &str, allowlist: &[&str]) -> Config {
    Config(Box::new(MeshdepotConfig {
        base: BaseConfig {
            server_port: 4000,
            cors_origins: vec!["*".to_string()],
            db_max_connections: 5,
            db_timeout_seconds: 5,
            environment: "test".to_string(),
            service_name: "meshdepot-api-test".to_string(),
        },
        database_url: "memory://".to_string(),
        storage_backend: Some(StorageBackend::Local),
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        aws_region: None,
        local_storage_path: Some(storage_path.to_string()),
        local_storage_base_url: Some(FILES_BASE_URL.to_string()),
        max_upload_size_bytes: 16 * 1024 * 1024,
        upload_queue_max_workers: 2,
        upload_queue_capacity: 16,
        id_generator_id: 1,
        download_cors_allowlist: allowlist.iter().map(|h| h.to_string()).collect(),
    }))
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_allowlist(&["archive.org"]).await
}

pub async fn setup_test_app_with_allowlist(allowlist: &[&str]) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let storage_path = temp_dir.path().to_string_lossy().to_string();
    let config = create_test_config(&storage_path, allowlist);

    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(temp_dir.path(), FILES_BASE_URL.to_string())
            .await
            .expect("Failed to create local storage"),
    );
    let db = database::setup_database(&config)
        .await
        .expect("Failed to set up in-memory store");
    let state = services::initialize_services(&config, db, storage)
        .expect("Failed to initialize services");
    let router = routes::setup_routes(&config, state.clone()).expect("Failed to build routes");

    let server = TestServer::new(router).expect("Failed to start test server");
    TestApp {
        server,
        state,
        _temp_dir: temp_dir,
    }
}

/// Poll an upload job until it leaves `pending`/`running`.
pub async fn wait_for_job(server: &TestServer, job_id: &str) -> Value {
    for _ in 0..200 {
        let job: Value = server
            .get(&api_path(&format!("/uploads/{}", job_id)))
            .await
            .json();
        match job["status"].as_str() {
            Some("completed") | Some("failed") => return job,
            _ => tokio::time::sleep(Duration::from_millis(25)).await,
        }
    }
    panic!("upload job {} did not finish", job_id);
}
