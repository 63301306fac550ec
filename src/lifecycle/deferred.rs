// SPDX-License-Identifier: GPL-3.0-only

//! One-shot delayed device release

use crate::backends::camera::DeviceGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Closes the device a grace period after it went idle
///
/// Timers run on the given runtime and are tracked so process shutdown can
/// wait for them. A pending timer is dropped when a new session begins or the
/// process token is cancelled.
pub struct DeferredShutdownScheduler {
    device: Arc<DeviceGuard>,
    grace: Duration,
    runtime: Handle,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    /// Token for the timers armed since the last `cancel_pending`
    pending: Mutex<CancellationToken>,
}

impl DeferredShutdownScheduler {
    pub fn new(
        device: Arc<DeviceGuard>,
        grace: Duration,
        runtime: Handle,
        tasks: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        let pending = shutdown.child_token();
        Self {
            device,
            grace,
            runtime,
            tasks,
            shutdown,
            pending: Mutex::new(pending),
        }
    }

    /// Arm a timer that releases the device if `active` is still zero on expiry
    ///
    /// Safe to call several times in a row; the device close is idempotent.
    pub fn schedule(&self, active: Arc<AtomicUsize>) {
        let token = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let device = Arc::clone(&self.device);
        let grace = self.grace;

        debug!(grace_ms = grace.as_millis() as u64, "Scheduling deferred camera shutdown");

        self.tasks.spawn_on(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Deferred shutdown cancelled");
                    }
                    _ = sleep(grace) => {
                        // The guard may be busy opening or reading for seconds
                        let release = tokio::task::spawn_blocking(move || device.release_if_idle(&active));
                        if let Err(e) = release.await {
                            warn!(error = %e, "Deferred camera shutdown failed");
                        }
                    }
                }
            },
            &self.runtime,
        );
    }

    /// Drop every armed timer without firing it
    pub fn cancel_pending(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.cancel();
        *pending = self.shutdown.child_token();
    }
}

impl std::fmt::Debug for DeferredShutdownScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredShutdownScheduler")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}
