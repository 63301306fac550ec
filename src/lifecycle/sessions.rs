// SPDX-License-Identifier: GPL-3.0-only

//! Active streaming session count

use super::deferred::DeferredShutdownScheduler;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Number of live streaming consumers
///
/// The count only changes through [`SessionGuard`], so every increment is
/// matched by exactly one decrement however the session ends.
#[derive(Debug)]
pub struct SessionCounter {
    active: Arc<AtomicUsize>,
    scheduler: DeferredShutdownScheduler,
}

impl SessionCounter {
    pub fn new(scheduler: DeferredShutdownScheduler) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            scheduler,
        }
    }

    /// Register a streaming session
    ///
    /// The session ends when the returned guard is dropped.
    pub fn begin(self: &Arc<Self>) -> SessionGuard {
        let previous = self.active.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            self.scheduler.cancel_pending();
        }
        debug!(active = previous + 1, "Streaming session started");
        SessionGuard {
            counter: Arc::clone(self),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Schedule a deferred shutdown if no session is running
    ///
    /// Used after one-off captures, which open the device without a session.
    pub fn schedule_if_idle(&self) -> bool {
        if self.active() == 0 {
            self.scheduler.schedule(Arc::clone(&self.active));
            true
        } else {
            false
        }
    }

    fn end(&self) {
        match self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(1) => {
                debug!("Last streaming session ended");
                self.scheduler.schedule(Arc::clone(&self.active));
            }
            Ok(previous) => debug!(active = previous - 1, "Streaming session ended"),
            Err(_) => warn!("Session end without matching begin"),
        }
    }
}

/// Keeps one session registered while alive
#[must_use = "the session ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SessionGuard {
    counter: Arc<SessionCounter>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.counter.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::DeviceGuard;
    use crate::backends::virtual_camera::{VirtualCamera, VirtualCameraProbe};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::time::sleep;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;

    fn setup() -> (Arc<DeviceGuard>, Arc<SessionCounter>, VirtualCameraProbe) {
        let camera = VirtualCamera::new(2, 2);
        let probe = camera.probe();
        let device = Arc::new(DeviceGuard::new(Box::new(camera), Duration::from_secs(60)));
        let scheduler = DeferredShutdownScheduler::new(
            Arc::clone(&device),
            Duration::from_secs(2),
            Handle::current(),
            TaskTracker::new(),
            CancellationToken::new(),
        );
        (device, Arc::new(SessionCounter::new(scheduler)), probe)
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_sessions_close_after_last_ends() {
        let (device, sessions, probe) = setup();
        assert!(device.ensure_ready());

        let first = sessions.begin();
        let second = sessions.begin();
        let third = sessions.begin();
        drop(first);
        drop(second);
        assert_eq!(sessions.active(), 1);

        sleep(Duration::from_secs(5)).await;
        assert!(device.status().open);

        drop(third);
        assert_eq!(sessions.active(), 0);
        sleep(Duration::from_millis(1900)).await;
        assert!(device.status().open);

        sleep(Duration::from_millis(200)).await;
        assert!(!device.status().open);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_keeps_device_open() {
        let (device, sessions, probe) = setup();
        assert!(device.ensure_ready());

        drop(sessions.begin());
        sleep(Duration::from_secs(1)).await;
        let _reconnected = sessions.begin();

        sleep(Duration::from_secs(5)).await;
        assert!(device.status().open);
        assert_eq!(probe.closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_ended_by_panic_is_counted() {
        let (_, sessions, _) = setup();
        let counter = Arc::clone(&sessions);

        let result = tokio::spawn(async move {
            let _session = counter.begin();
            panic!("stream failed");
        })
        .await;

        assert!(result.is_err());
        assert_eq!(sessions.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sessions_never_go_negative() {
        let (device, sessions, probe) = setup();
        assert!(device.ensure_ready());

        let mut handles = Vec::new();
        for i in 0..16u64 {
            let sessions = Arc::clone(&sessions);
            handles.push(tokio::spawn(async move {
                let _session = sessions.begin();
                sleep(Duration::from_millis(10 * i)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(sessions.active(), 0);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_if_idle() {
        let (device, sessions, _) = setup();
        assert!(device.ensure_ready());

        let session = sessions.begin();
        assert!(!sessions.schedule_if_idle());
        drop(session);
        assert!(sessions.schedule_if_idle());

        sleep(Duration::from_secs(3)).await;
        assert!(!device.status().open);
    }
}
