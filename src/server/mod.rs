// SPDX-License-Identifier: GPL-3.0-only

//! HTTP surface
//!
//! | Method | Path              | Action                                  |
//! |--------|-------------------|-----------------------------------------|
//! | GET    | `/video_feed`     | multipart JPEG stream                   |
//! | POST   | `/capture`        | capture one frame to disk               |
//! | GET    | `/image`          | download the last capture               |
//! | GET    | `/health`         | device and session status               |
//! | POST   | `/shutdown-camera`| force the device closed                 |
//! | POST   | `/reopen-camera`  | allow the device to open again          |
//! | POST   | `/shutdown`       | close the device and stop the server    |

pub mod error;
pub mod routes;

pub use error::ApiError;

use crate::service::CameraService;
use axum::Router;
use axum::routing::{get, post};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<CameraService>,
    /// Cancelled to stop the whole process
    pub shutdown: CancellationToken,
    /// `http://host:port` as seen by clients
    pub public_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/video_feed", get(routes::video_feed))
        .route("/capture", post(routes::capture))
        .route("/image", get(routes::image))
        .route("/health", get(routes::health))
        .route("/shutdown-camera", post(routes::shutdown_camera))
        .route("/reopen-camera", post(routes::reopen_camera))
        .route("/shutdown", post(routes::shutdown))
        .with_state(state)
}

/// Serve until the state's shutdown token is cancelled
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        info!("Starting HTTP server on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// LAN address of this machine, or loopback when none is found
pub fn default_host() -> IpAddr {
    match local_ip_address::local_ip() {
        Ok(ip) => ip,
        Err(e) => {
            warn!(error = %e, "No LAN address found, binding to loopback");
            IpAddr::from([127, 0, 0, 1])
        }
    }
}
