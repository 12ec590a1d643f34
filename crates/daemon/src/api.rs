use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use devices::RoverWriter;
use futures::StreamExt;
use gateway_types::{CameraMode, ErrorCounters, ModeConfig};
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;

use crate::hub::Hub;
use crate::router::CommandRouter;
use crate::session::SessionLifecycle;
use crate::video::{VideoPipeline, MULTIPART_BOUNDARY};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub router: Arc<CommandRouter>,
    pub lifecycle: Arc<SessionLifecycle>,
    pub rover: RoverWriter,
    pub video: Arc<VideoPipeline>,
    pub errors: Arc<ErrorCounters>,
    /// Hub queue depth for each new session
    pub session_buffer: usize,
}

/// HTTP routes. The WebSocket route is added by the server.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/video_feed", get(video_feed_handler))
        .route("/api/config", get(get_config_handler).post(update_config_handler))
        .route("/api/metrics", get(metrics_handler))
}

pub async fn get_config_handler(State(state): State<AppState>) -> Json<ModeConfig> {
    Json(ModeConfig {
        camera_mode: state.router.modes().camera_mode(),
    })
}

/// Persist a new camera mode and restart the video pipeline for it.
pub async fn update_config_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let Some(mode) = body
        .get("camera_mode")
        .and_then(|v| serde_json::from_value::<CameraMode>(v.clone()).ok())
    else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "status": "error" })));
    };

    if let Err(e) = state.router.modes().set_camera_mode(mode) {
        tracing::error!("Failed to save mode config: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error" })),
        );
    }
    tracing::info!(?mode, "Camera mode changed");

    if state.video.is_enabled() {
        if let Err(e) = state.video.start(mode).await {
            tracing::warn!("Failed to restart video pipeline: {}", e);
        }
    }

    (StatusCode::OK, Json(json!({ "status": "ok", "mode": mode })))
}

/// Relay the video pipeline's multipart stream.
pub async fn video_feed_handler(State(state): State<AppState>) -> Response {
    if !state.video.is_enabled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "video disabled").into_response();
    }

    // A lagging viewer skips ahead; the multipart boundaries resync the client
    let chunks = BroadcastStream::new(state.video.subscribe())
        .filter_map(|res| async move { res.ok() })
        .map(Ok::<Bytes, Infallible>);

    Response::builder()
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from_stream(chunks))
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build video response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

pub async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "hub": state.hub.metrics().await,
        "errors": state.errors.snapshot(),
        "sessions": state.lifecycle.active().await,
    }))
}
