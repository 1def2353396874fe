use crate::archive::Archive;
use crate::camera::FrameCapture;
use crate::config::{CameraConfig, ServerConfig, StorageConfig};
use crate::error::Result;
use crate::session::SessionController;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) controller: Arc<SessionController>,
    pub(crate) archive: Arc<Archive>,
    pub(crate) capture: Arc<dyn FrameCapture>,
    pub(crate) camera: CameraConfig,
    pub(crate) storage: StorageConfig,
}

/// HTTP server exposing the camera, session and archive operations.
pub struct ApiServer {
    config: ServerConfig,
    state: ServerState,
}

impl ApiServer {
    pub fn new(
        config: ServerConfig,
        controller: Arc<SessionController>,
        archive: Arc<Archive>,
        capture: Arc<dyn FrameCapture>,
        camera: CameraConfig,
        storage: StorageConfig,
    ) -> Self {
        Self {
            config,
            state: ServerState {
                controller,
                archive,
                capture,
                camera,
                storage,
            },
        }
    }

    /// Build the route table. Routes map 1:1 onto controller/archive
    /// operations plus the single-shot snapshot endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/camera", get(handlers::snapshot))
            .route("/timelapse/start", post(handlers::start))
            .route("/timelapse/stop", post(handlers::stop))
            .route("/timelapse/status", get(handlers::status))
            .route("/timelapse/frame", get(handlers::frame_info))
            .route("/timelapse/latest-frame", get(handlers::latest_frame))
            .route("/timelapses", get(handlers::list))
            .route("/timelapses/:id/download", get(handlers::download))
            .route("/timelapses/:id", delete(handlers::remove))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the process shuts down.
    pub async fn serve(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        info!("Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("API server listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
