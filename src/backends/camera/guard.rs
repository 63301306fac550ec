// SPDX-License-Identifier: GPL-3.0-only

//! Mutual-exclusion wrapper around the capture device
//!
//! The guard owns the only device handle in the process. Every public method
//! runs inside one critical section, so callers always observe a consistent
//! `(handle, last_used_at, shutdown_requested)` triple.
//!
//! ```text
//!            ensure_ready (ok)
//!   Closed ─────────────────────▶ Open
//!     ▲  ◀── idle timeout / read failure ──┘
//!     │                                    │
//!   reopen                          request_shutdown
//!     │                                    ▼
//!     └──────────────────────────── ShuttingDown
//! ```

use super::types::{DeviceStatus, Frame};
use super::{CaptureBackend, OpenDevice};
use crate::clock::{Clock, SystemClock};
use crate::errors::{CameraError, CameraResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Internal guard state
struct GuardState {
    backend: Box<dyn CaptureBackend>,
    /// `Some` only while `shutdown_requested` is false
    handle: Option<Box<dyn OpenDevice>>,
    last_used_at: Instant,
    shutdown_requested: bool,
    open_count: u64,
}

/// Shared access point to the capture device
///
/// Thread-safe; share it behind an `Arc`.
pub struct DeviceGuard {
    state: Mutex<GuardState>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    name: String,
}

impl DeviceGuard {
    /// Create a guard in the closed state
    pub fn new(backend: Box<dyn CaptureBackend>, idle_timeout: Duration) -> Self {
        Self::with_clock(backend, idle_timeout, Arc::new(SystemClock))
    }

    /// Create a guard reading time from `clock`
    pub fn with_clock(
        backend: Box<dyn CaptureBackend>,
        idle_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = backend.name();
        info!(device = %name, idle_timeout_secs = idle_timeout.as_secs(), "Creating device guard");

        let state = GuardState {
            backend,
            handle: None,
            last_used_at: clock.now(),
            shutdown_requested: false,
            open_count: 0,
        };

        Self {
            state: Mutex::new(state),
            clock,
            idle_timeout,
            name,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // A panic inside a backend call must not wedge every later request
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make sure a usable handle exists
    ///
    /// Returns false immediately while a shutdown is requested. Otherwise opens
    /// the device if needed, recycling it first when it sat idle longer than the
    /// configured threshold.
    pub fn ensure_ready(&self) -> bool {
        let mut state = self.lock();
        match self.ensure_ready_locked(&mut state) {
            Ok(()) => true,
            Err(CameraError::ShutdownInProgress) => {
                warn!(device = %self.name, "Shutdown requested, not reopening camera");
                false
            }
            Err(e) => {
                warn!(device = %self.name, error = %e, "Camera not ready");
                false
            }
        }
    }

    /// Read one frame from the already-open device
    ///
    /// `last_used_at` is refreshed on every attempt. A failed read closes the
    /// handle so the next `ensure_ready` reopens it; no retry happens here.
    pub fn read_frame(&self) -> CameraResult<Frame> {
        let mut state = self.lock();
        self.read_locked(&mut state)
    }

    /// `ensure_ready` followed by a single read, in one critical section
    pub fn capture_once(&self) -> CameraResult<Frame> {
        let mut state = self.lock();
        self.ensure_ready_locked(&mut state)?;
        self.read_locked(&mut state)
    }

    /// Forcefully close the device and refuse to reopen until [`reopen`](Self::reopen)
    ///
    /// Active sessions are not consulted. Returns whether a handle was open.
    pub fn request_shutdown(&self) -> bool {
        let mut state = self.lock();
        state.shutdown_requested = true;
        let was_open = Self::close_locked(&mut state);
        info!(device = %self.name, was_open, "Camera force-shut down");
        was_open
    }

    /// Clear a previous shutdown request
    pub fn reopen(&self) {
        let mut state = self.lock();
        if state.shutdown_requested {
            info!(device = %self.name, "Camera re-enabled");
        }
        state.shutdown_requested = false;
    }

    /// Close the device if `active` reads zero, leaving the shutdown flag alone
    ///
    /// The count is read inside the critical section, so a session that
    /// already got the device open is never cut off. Used by the deferred idle
    /// shutdown. Returns whether a handle was closed.
    pub fn release_if_idle(&self, active: &AtomicUsize) -> bool {
        let mut state = self.lock();
        let sessions = active.load(Ordering::SeqCst);
        if sessions > 0 {
            info!(device = %self.name, active = sessions, "Sessions resumed, keeping camera open");
            return false;
        }

        let closed = Self::close_locked(&mut state);
        if closed {
            info!(device = %self.name, "Closed camera with no active streams");
        }
        closed
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.lock().shutdown_requested
    }

    pub fn status(&self) -> DeviceStatus {
        let state = self.lock();
        DeviceStatus {
            open: state.handle.is_some(),
            shutdown_requested: state.shutdown_requested,
            open_count: state.open_count,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_ready_locked(&self, state: &mut GuardState) -> CameraResult<()> {
        if state.shutdown_requested {
            return Err(CameraError::ShutdownInProgress);
        }

        if state.handle.is_some() {
            let idle = self.clock.now().saturating_duration_since(state.last_used_at);
            if idle <= self.idle_timeout {
                return Ok(());
            }
            info!(
                device = %self.name,
                idle_secs = idle.as_secs(),
                "Camera idle past timeout, recycling"
            );
            Self::close_locked(state);
        }

        debug!(device = %self.name, "Opening camera");
        match state.backend.open() {
            Ok(handle) => {
                state.handle = Some(handle);
                state.last_used_at = self.clock.now();
                state.open_count += 1;
                info!(device = %self.name, opens = state.open_count, "Camera opened");
                Ok(())
            }
            Err(e) => {
                warn!(device = %self.name, error = %e, "Failed to open camera");
                Err(match e {
                    CameraError::DeviceUnavailable(msg) => CameraError::DeviceUnavailable(msg),
                    other => CameraError::DeviceUnavailable(other.to_string()),
                })
            }
        }
    }

    fn read_locked(&self, state: &mut GuardState) -> CameraResult<Frame> {
        if state.shutdown_requested {
            return Err(CameraError::ShutdownInProgress);
        }

        let Some(handle) = state.handle.as_mut() else {
            return Err(CameraError::unavailable("camera is not open"));
        };

        let result = handle.read_frame();
        state.last_used_at = self.clock.now();

        match result {
            Ok(frame) => Ok(frame),
            Err(e) => {
                warn!(device = %self.name, error = %e, "Frame grab failed, resetting camera");
                Self::close_locked(state);
                Err(match e {
                    CameraError::ReadFailure(msg) => CameraError::ReadFailure(msg),
                    other => CameraError::ReadFailure(other.to_string()),
                })
            }
        }
    }

    fn close_locked(state: &mut GuardState) -> bool {
        match state.handle.take() {
            Some(mut handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        if Self::close_locked(state) {
            debug!(device = %self.name, "Camera released on drop");
        }
    }
}

impl std::fmt::Debug for DeviceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("DeviceGuard")
            .field("device", &self.name)
            .field("open", &status.open)
            .field("shutdown_requested", &status.shutdown_requested)
            .finish()
    }
}
