// SPDX-License-Identifier: GPL-3.0-only

//! HTTP error mapping

use crate::errors::{CameraError, CaptureError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Failure of a request handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    NotFound(String),
}

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Camera(e) => ApiError::Camera(e),
            CaptureError::Io(e) => ApiError::Io(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Camera(CameraError::DeviceUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Camera(CameraError::ShutdownInProgress) => StatusCode::CONFLICT,
            ApiError::Camera(CameraError::ReadFailure(_) | CameraError::Encoding(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
