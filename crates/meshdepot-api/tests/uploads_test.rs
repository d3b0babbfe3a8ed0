//! Upload and ingestion integration tests.
//!
//! Run with: `cargo test -p meshdepot-api --test uploads_test`

mod helpers;

use axum::http::StatusCode;
use helpers::fixtures::{self, upload_form};
use helpers::{api_path, setup_test_app, wait_for_job, FILES_BASE_URL, OWNER};
use serde_json::Value;

async fn upload(app: &helpers::TestApp, files: &[(&str, &[u8])]) -> (String, i64) {
    let response = app
        .client()
        .post(&api_path("/assets/uploads"))
        .add_header("x-owner-id", OWNER)
        .multipart(upload_form(files))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    let job_id = body["upload_job"].as_str().expect("job id").to_string();
    let asset_id = body["asset_id"].as_i64().expect("asset id");
    (job_id, asset_id)
}

#[tokio::test]
async fn test_obj_upload_attaches_material_and_texture() {
    let app = setup_test_app().await;
    let (job_id, asset_id) = upload(
        &app,
        &[
            ("statue.obj", fixtures::OBJ),
            ("statue.mtl", fixtures::MTL),
            ("statue_diffuse.png", fixtures::PNG),
        ],
    )
    .await;

    let job = wait_for_job(app.client(), &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["asset_id"].as_i64(), Some(asset_id));
    assert_eq!(job["report"]["formats_created"], 1);
    assert_eq!(job["report"]["resources_created"], 3);

    let asset: Value = app
        .client()
        .get(&api_path(&format!("/assets/{}", asset_id)))
        .await
        .json();
    assert_eq!(asset["name"], "statue");
    assert_eq!(asset["status"], "uploading");

    let formats = asset["formats"].as_array().expect("formats");
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0]["format_type"], "OBJ");
    assert_eq!(formats[0]["root"]["file_name"], "statue.obj");
    let mut dependents: Vec<&str> = formats[0]["resources"]
        .as_array()
        .expect("resources")
        .iter()
        .filter_map(|r| r["file_name"].as_str())
        .collect();
    dependents.sort_unstable();
    assert_eq!(dependents, vec!["statue.mtl", "statue_diffuse.png"]);
}

#[tokio::test]
async fn test_each_main_file_becomes_a_format_and_glb_is_viewed() {
    let app = setup_test_app().await;
    let (job_id, asset_id) = upload(&app, &[("a.glb", fixtures::GLB), ("b.fbx", fixtures::FBX)]).await;
    assert_eq!(wait_for_job(app.client(), &job_id).await["status"], "completed");

    let asset: Value = app
        .client()
        .get(&api_path(&format!("/assets/{}", asset_id)))
        .await
        .json();
    assert_eq!(asset["name"], "a");
    let formats = asset["formats"].as_array().expect("formats");
    assert_eq!(formats.len(), 2);
    for format in formats {
        assert!(format["root"].is_object());
        assert!(format["resources"].as_array().expect("resources").is_empty());
    }

    let viewer: Value = app
        .client()
        .get(&api_path(&format!("/assets/{}/viewer", asset_id)))
        .await
        .json();
    assert_eq!(viewer["format_type"], "GLB");
    assert_eq!(viewer["content_type"], "model/gltf-binary");
    assert!(viewer["url"].as_str().expect("url").ends_with("/a.glb"));
}

#[tokio::test]
async fn test_zip_upload_extracts_thumbnail_and_buffers() {
    let app = setup_test_app().await;
    let archive = fixtures::zip_archive(&[
        ("model.gltf", fixtures::GLTF),
        ("model.bin", fixtures::BIN),
        ("thumbnail.png", fixtures::PNG),
    ]);
    let (job_id, asset_id) = upload(&app, &[("bundle.zip", archive.as_slice())]).await;
    let job = wait_for_job(app.client(), &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["report"]["thumbnail"], true);

    let asset: Value = app
        .client()
        .get(&api_path(&format!("/assets/{}", asset_id)))
        .await
        .json();
    assert!(asset["thumbnail_url"].as_str().is_some());
    let formats = asset["formats"].as_array().expect("formats");
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0]["format_type"], "GLTF2");
    assert_eq!(formats[0]["resources"][0]["file_name"], "model.bin");
}

#[tokio::test]
async fn test_archive_without_models_fails_the_job() {
    let app = setup_test_app().await;
    let archive = fixtures::zip_archive(&[("readme.txt", &b"hello"[..])]);
    let (job_id, asset_id) = upload(&app, &[("bundle.zip", archive.as_slice())]).await;

    let job = wait_for_job(app.client(), &job_id).await;
    assert_eq!(job["status"], "failed");
    assert!(job["error"].as_str().is_some());

    let asset: Value = app
        .client()
        .get(&api_path(&format!("/assets/{}", asset_id)))
        .await
        .json();
    assert_eq!(asset["status"], "failed");
    assert!(asset["formats"].as_array().expect("formats").is_empty());
}

#[tokio::test]
async fn test_upload_without_files_is_rejected() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post(&api_path("/assets/uploads"))
        .add_header("x-owner-id", OWNER)
        .multipart(upload_form(&[]))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_upload_without_model_files_is_rejected_up_front() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post(&api_path("/assets/uploads"))
        .add_header("x-owner-id", OWNER)
        .multipart(upload_form(&[("notes.txt", &b"hi"[..]), ("texture.png", fixtures::PNG)]))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_upload_requires_owner() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post(&api_path("/assets/uploads"))
        .multipart(upload_form(&[("a.glb", fixtures::GLB)]))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .get(&api_path("/uploads/00000000-0000-0000-0000-000000000000"))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stored_files_are_served() {
    let app = setup_test_app().await;
    let (job_id, asset_id) = upload(&app, &[("a.glb", fixtures::GLB)]).await;
    assert_eq!(wait_for_job(app.client(), &job_id).await["status"], "completed");

    let asset: Value = app
        .client()
        .get(&api_path(&format!("/assets/{}", asset_id)))
        .await
        .json();
    let url = asset["formats"][0]["root"]["url"].as_str().expect("url");
    let path = url
        .strip_prefix(FILES_BASE_URL.trim_end_matches("/files"))
        .expect("platform url");

    let response = app.client().get(path).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.as_bytes().as_ref(), fixtures::GLB);
    assert_eq!(
        response.header("content-type").to_str().expect("header"),
        "model/gltf-binary"
    );
}
