use super::handlers::status_for;
use super::ApiServer;
use crate::archive::Archive;
use crate::camera::{FrameCapture, Resolution};
use crate::config::LapsecamConfig;
use crate::error::{LapsecamError, Result};
use crate::session::SessionController;
use crate::video::VideoAssembler;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct WritingCapture;

#[async_trait]
impl FrameCapture for WritingCapture {
    async fn capture(&self, dest: &Path, _resolution: &Resolution) -> Result<()> {
        tokio::fs::write(dest, b"jpeg").await?;
        Ok(())
    }
}

struct NoopAssembler;

#[async_trait]
impl VideoAssembler for NoopAssembler {
    async fn assemble(&self, _frames: &[PathBuf], output: &Path, _fps: u32) -> Result<()> {
        tokio::fs::write(output, b"mp4").await?;
        Ok(())
    }
}

fn test_router(dir: &TempDir) -> Router {
    let mut config = LapsecamConfig::default();
    config.storage.timelapse_path = dir.path().join("timelapses").to_string_lossy().to_string();
    config.storage.video_temp_path = dir.path().join("videos").to_string_lossy().to_string();
    config.archive.display_timezone = "UTC".to_string();
    std::fs::create_dir_all(dir.path().join("timelapses")).unwrap();
    std::fs::create_dir_all(dir.path().join("videos")).unwrap();

    let capture: Arc<dyn FrameCapture> = Arc::new(WritingCapture);
    let controller = Arc::new(SessionController::new(
        Arc::clone(&capture),
        config.storage.clone(),
        config.session.clone(),
    ));
    let archive = Arc::new(
        Archive::new(
            config.storage.clone(),
            config.archive.clone(),
            Arc::new(NoopAssembler),
        )
        .unwrap(),
    );

    ApiServer::new(
        config.server.clone(),
        controller,
        archive,
        capture,
        config.camera.clone(),
        config.storage.clone(),
    )
    .router()
}

async fn send(router: &Router, request: Request<Body>) -> StatusCode {
    router.clone().oneshot(request).await.unwrap().status()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_status_is_always_available() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    assert_eq!(send(&router, get("/timelapse/status")).await, StatusCode::OK);
    assert_eq!(send(&router, get("/timelapse/frame")).await, StatusCode::OK);
    assert_eq!(send(&router, get("/timelapses")).await, StatusCode::OK);
}

#[tokio::test]
async fn test_stop_without_session_is_conflict() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    let status = send(
        &router,
        post_json("/timelapse/stop", ""),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_start_stop_round_trip() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    let body = r#"{"frequency": 1, "duration": 60, "resolution": "640x480"}"#;
    assert_eq!(
        send(&router, post_json("/timelapse/start", body)).await,
        StatusCode::OK
    );

    // A second start while running is rejected
    assert_eq!(
        send(&router, post_json("/timelapse/start", body)).await,
        StatusCode::CONFLICT
    );

    assert_eq!(
        send(&router, post_json("/timelapse/stop", "")).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_start_with_invalid_config_is_unprocessable() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    // Zero frequency fails controller validation
    let body = r#"{"frequency": 0, "duration": 60, "resolution": "640x480"}"#;
    assert_eq!(
        send(&router, post_json("/timelapse/start", body)).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );

    // A malformed resolution fails body deserialization
    let body = r#"{"frequency": 1, "duration": 60, "resolution": "wide"}"#;
    assert_eq!(
        send(&router, post_json("/timelapse/start", body)).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn test_latest_frame_without_capture_is_not_found() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    assert_eq!(
        send(&router, get("/timelapse/latest-frame")).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_unknown_timelapse_operations_are_not_found() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    assert_eq!(
        send(&router, get("/timelapses/missing/download")).await,
        StatusCode::NOT_FOUND
    );

    let delete = Request::builder()
        .method("DELETE")
        .uri("/timelapses/missing")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&router, delete).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_and_delete_existing_timelapse() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    let session = dir.path().join("timelapses").join("abc");
    std::fs::create_dir_all(&session).unwrap();
    std::fs::write(session.join("frame_1.jpg"), b"jpeg").unwrap();

    assert_eq!(
        send(&router, get("/timelapses/abc/download")).await,
        StatusCode::OK
    );

    let delete = Request::builder()
        .method("DELETE")
        .uri("/timelapses/abc")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&router, delete).await, StatusCode::OK);
    assert!(!session.exists());
}

#[tokio::test]
async fn test_snapshot_returns_image() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    let response = router.clone().oneshot(get("/camera")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
}

#[test]
fn test_error_status_mapping() {
    assert_eq!(
        status_for(&LapsecamError::AlreadyRunning),
        StatusCode::CONFLICT
    );
    assert_eq!(status_for(&LapsecamError::NotRunning), StatusCode::CONFLICT);
    assert_eq!(
        status_for(&LapsecamError::invalid_config("bad")),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        status_for(&LapsecamError::NoFrameAvailable),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_for(&LapsecamError::not_found("abc")),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_for(&LapsecamError::assembly("encoder died")),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_for(&LapsecamError::capture("device busy")),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
