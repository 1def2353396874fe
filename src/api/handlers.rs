use crate::camera::Resolution;
use crate::error::LapsecamError;
use crate::session::SessionConfig;
use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::error;

/// Stable status code for each error in the taxonomy.
pub(crate) fn status_for(error: &LapsecamError) -> StatusCode {
    match error {
        LapsecamError::AlreadyRunning | LapsecamError::NotRunning => StatusCode::CONFLICT,
        LapsecamError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LapsecamError::NoFrameAvailable | LapsecamError::SessionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for LapsecamError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

type HandlerResult<T> = std::result::Result<T, LapsecamError>;

/// GET /camera — capture and return a single snapshot.
pub(crate) async fn snapshot(State(state): State<super::ServerState>) -> HandlerResult<Response> {
    let resolution: Resolution = state.camera.default_resolution.parse()?;
    let dest = PathBuf::from(&state.storage.video_temp_path)
        .join(format!("snapshot.{}", state.storage.frame_extension));

    state.capture.capture(&dest, &resolution).await?;
    file_response(&dest, "image/jpeg", None).await
}

/// POST /timelapse/start
pub(crate) async fn start(
    State(state): State<super::ServerState>,
    Json(config): Json<SessionConfig>,
) -> HandlerResult<Response> {
    let receipt = state.controller.start(config).await?;
    Ok(Json(json!({
        "status": "timelapse started",
        "timelapse_id": receipt.timelapse_id,
        "config": receipt.config,
    }))
    .into_response())
}

/// POST /timelapse/stop
pub(crate) async fn stop(State(state): State<super::ServerState>) -> HandlerResult<Response> {
    state.controller.stop()?;
    Ok(Json(json!({ "status": "timelapse stopped" })).into_response())
}

/// GET /timelapse/status
pub(crate) async fn status(State(state): State<super::ServerState>) -> Response {
    Json(state.controller.status()).into_response()
}

/// GET /timelapse/frame
pub(crate) async fn frame_info(State(state): State<super::ServerState>) -> Response {
    Json(state.controller.frame_info()).into_response()
}

/// GET /timelapse/latest-frame
pub(crate) async fn latest_frame(
    State(state): State<super::ServerState>,
) -> HandlerResult<Response> {
    let path = state.controller.latest_frame().await?;
    file_response(&path, "image/jpeg", None).await
}

/// GET /timelapses
pub(crate) async fn list(State(state): State<super::ServerState>) -> HandlerResult<Response> {
    let entries = state.archive.list().await?;
    Ok(Json(entries).into_response())
}

/// GET /timelapses/{id}/download — assemble the session video and stream it.
pub(crate) async fn download(
    State(state): State<super::ServerState>,
    UrlPath(id): UrlPath<String>,
) -> HandlerResult<Response> {
    let video = state.archive.assemble(&id).await?;
    let filename = format!("{id}.mp4");
    file_response(&video, "video/mp4", Some(&filename)).await
}

/// DELETE /timelapses/{id}
pub(crate) async fn remove(
    State(state): State<super::ServerState>,
    UrlPath(id): UrlPath<String>,
) -> HandlerResult<Response> {
    state.archive.delete(&id).await?;
    Ok(Json(json!({ "status": "timelapse deleted" })).into_response())
}

/// Stream a file back to the client without buffering it in memory.
async fn file_response(
    path: &Path,
    content_type: &'static str,
    download_name: Option<&str>,
) -> HandlerResult<Response> {
    let file = tokio::fs::File::open(path).await?;
    let stream = ReaderStream::new(file);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);

    if let Some(name) = download_name {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        );
    }

    Ok(builder.body(Body::from_stream(stream)).unwrap())
}
