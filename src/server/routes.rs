// SPDX-License-Identifier: GPL-3.0-only

//! Request handlers

use super::{ApiError, AppState};
use crate::constants::{CAPTURE_DOWNLOAD_NAME, STREAM_BOUNDARY};
use crate::errors::CameraError;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{info, warn};

pub async fn video_feed(State(state): State<AppState>) -> Result<Response, ApiError> {
    if state.service.is_shutdown_requested().await? {
        return Err(CameraError::ShutdownInProgress.into());
    }

    info!("Video stream requested");
    let body = Body::from_stream(state.service.frame_stream());
    Ok((
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", STREAM_BOUNDARY),
        )],
        body,
    )
        .into_response())
}

pub async fn capture(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.service.capture_to_file().await?;
    Ok(Json(json!({
        "message": "Image captured",
        "url": format!("{}/image", state.public_url),
    })))
}

pub async fn image(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(path) = state.service.last_capture() else {
        return Err(ApiError::NotFound("No image found".into()));
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("No image found".into()));
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CAPTURE_DOWNLOAD_NAME),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.service.status().await?;
    Ok(Json(json!({
        "status": "healthy",
        "device_open": status.device.open,
        "shutdown_requested": status.device.shutdown_requested,
        "device_opens": status.device.open_count,
        "active_sessions": status.active_sessions,
    })))
}

pub async fn shutdown_camera(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let was_open = state.service.shutdown_device().await?;
    Ok(Json(json!({
        "message": "Camera shutdown requested",
        "was_open": was_open,
    })))
}

pub async fn reopen_camera(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.service.reopen_device().await?;
    Ok(Json(json!({ "message": "Camera re-enabled" })))
}

pub async fn shutdown(State(state): State<AppState>) -> Json<Value> {
    info!("Shutdown requested over HTTP");
    if let Err(e) = state.service.shutdown_device().await {
        warn!(error = %e, "Camera shutdown failed");
    }
    state.shutdown.cancel();
    Json(json!({ "message": "Server shutting down" }))
}
