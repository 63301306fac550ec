// SPDX-License-Identifier: GPL-3.0-only

//! Camera operations exposed to the HTTP layer
//!
//! [`CameraService`] ties the device guard to session tracking and the
//! deferred shutdown. Hardware calls and JPEG encoding run on blocking threads;
//! the guard is held for exactly one frame read at a time.

use crate::backends::camera::{CaptureBackend, DeviceGuard, DeviceStatus};
use crate::config::ServerConfig;
use crate::constants::{CAPTURE_FILE_NAME, STREAM_BOUNDARY, STREAM_RETRY_DELAY, TEMP_FILE_MARKER};
use crate::errors::{CameraError, CameraResult, CaptureError};
use crate::lifecycle::{DeferredShutdownScheduler, SessionCounter};
use crate::media::encode_jpeg;
use async_stream::stream;
use futures::Stream;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Point-in-time view used by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub device: DeviceStatus,
    pub active_sessions: usize,
}

/// Shared camera facade
#[derive(Debug)]
pub struct CameraService {
    device: Arc<DeviceGuard>,
    sessions: Arc<SessionCounter>,
    shutdown: CancellationToken,
    images_dir: PathBuf,
    jpeg_quality: u8,
}

impl CameraService {
    /// Wire a backend into a guard, session counter and deferred shutdown
    ///
    /// Deferred-shutdown timers run on `runtime` and are tracked by `tasks`.
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        config: &ServerConfig,
        images_dir: PathBuf,
        runtime: Handle,
        tasks: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        let device = Arc::new(DeviceGuard::new(backend, config.lifecycle.idle_timeout()));
        let scheduler = DeferredShutdownScheduler::new(
            Arc::clone(&device),
            config.lifecycle.shutdown_grace(),
            runtime,
            tasks,
            shutdown.clone(),
        );

        Self {
            device,
            sessions: Arc::new(SessionCounter::new(scheduler)),
            shutdown,
            images_dir,
            jpeg_quality: config.device.jpeg_quality,
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Where the latest capture is stored
    pub fn capture_path(&self) -> PathBuf {
        self.images_dir.join(CAPTURE_FILE_NAME)
    }

    /// Path of the latest capture, if one exists
    pub fn last_capture(&self) -> Option<PathBuf> {
        let path = self.capture_path();
        path.is_file().then_some(path)
    }

    /// Run `op` against the guard on a blocking thread
    ///
    /// The guard stays locked across device opens and frame reads, so it is
    /// never waited on from a runtime worker.
    async fn with_device<T, F>(&self, op: F) -> CameraResult<T>
    where
        F: FnOnce(&DeviceGuard) -> T + Send + 'static,
        T: Send + 'static,
    {
        let device = Arc::clone(&self.device);
        tokio::task::spawn_blocking(move || op(&device))
            .await
            .map_err(|e| CameraError::unavailable(format!("device task failed: {}", e)))
    }

    /// Grab one frame and encode it as JPEG
    pub async fn capture_jpeg(&self) -> CameraResult<Vec<u8>> {
        let quality = self.jpeg_quality;
        self.with_device(move |device| {
            let frame = device.capture_once()?;
            encode_jpeg(&frame, quality)
        })
        .await?
    }

    /// Capture one frame into `<images>/captured.jpg`
    ///
    /// The file is replaced atomically. Afterwards the device is scheduled
    /// for a deferred close unless a stream is using it.
    pub async fn capture_to_file(&self) -> Result<PathBuf, CaptureError> {
        let result = self.capture_jpeg().await;
        self.sessions.schedule_if_idle();
        let jpeg = result?;

        tokio::fs::create_dir_all(&self.images_dir).await?;
        let target = self.capture_path();
        let temp = self.images_dir.join(format!(
            "{}{}{}",
            CAPTURE_FILE_NAME,
            TEMP_FILE_MARKER,
            uuid::Uuid::new_v4()
        ));

        if let Err(e) = tokio::fs::write(&temp, &jpeg).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        info!(path = %target.display(), bytes = jpeg.len(), "Image captured");
        Ok(target)
    }

    /// Live multipart JPEG stream
    ///
    /// Each item is one `--frame` part. The stream counts as a session for as
    /// long as it is alive and ends between frames once the device is shut
    /// down, becomes unavailable, or the process is stopping. Read failures
    /// are logged and retried.
    pub fn frame_stream(self: &Arc<Self>) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
        let service = Arc::clone(self);
        let session = self.sessions.begin();

        stream! {
            let _session = session;
            let mut frames: u64 = 0;

            loop {
                if service.shutdown.is_cancelled() {
                    debug!("Process stopping, ending stream");
                    break;
                }

                let device = Arc::clone(&service.device);
                let quality = service.jpeg_quality;
                let capture = tokio::task::spawn_blocking(move || {
                    let frame = device.capture_once()?;
                    encode_jpeg(&frame, quality)
                });

                let result = tokio::select! {
                    _ = service.shutdown.cancelled() => break,
                    result = capture => result,
                };

                match result {
                    Ok(Ok(jpeg)) => {
                        frames += 1;
                        yield Ok(multipart_part(&jpeg));
                    }
                    Ok(Err(e @ (CameraError::ReadFailure(_) | CameraError::Encoding(_)))) => {
                        warn!(error = %e, "Frame failed, retrying");
                        tokio::time::sleep(STREAM_RETRY_DELAY).await;
                    }
                    Ok(Err(CameraError::ShutdownInProgress)) => {
                        info!("Camera shut down, ending stream");
                        break;
                    }
                    Ok(Err(e @ CameraError::DeviceUnavailable(_))) => {
                        warn!(error = %e, "Camera unavailable, ending stream");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Capture task failed, ending stream");
                        break;
                    }
                }
            }

            debug!(frames, "Stream finished");
        }
    }

    /// Force the device closed and keep it closed until re-enabled
    ///
    /// Returns whether a handle was open.
    pub async fn shutdown_device(&self) -> CameraResult<bool> {
        self.with_device(|device| device.request_shutdown()).await
    }

    /// Allow the device to be opened again after [`shutdown_device`](Self::shutdown_device)
    pub async fn reopen_device(&self) -> CameraResult<()> {
        self.with_device(|device| device.reopen()).await
    }

    pub async fn is_shutdown_requested(&self) -> CameraResult<bool> {
        self.with_device(|device| device.is_shutdown_requested()).await
    }

    pub async fn status(&self) -> CameraResult<ServiceStatus> {
        let device = self.with_device(|device| device.status()).await?;
        Ok(ServiceStatus {
            device,
            active_sessions: self.sessions.active(),
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }
}

/// Wrap a JPEG in one `multipart/x-mixed-replace` part
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", STREAM_BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}
