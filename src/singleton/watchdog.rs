// SPDX-License-Identifier: GPL-3.0-only

//! Parent process liveness watchdog

use super::process::ProcessTable;
use crate::errors::SupervisorError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Polls the launching process and reports the first time it is gone
///
/// A single negative observation is terminal.
pub struct ParentWatchdog {
    parent_pid: i32,
    poll_interval: Duration,
    processes: Arc<dyn ProcessTable>,
}

impl ParentWatchdog {
    pub fn new(parent_pid: i32, poll_interval: Duration, processes: Arc<dyn ProcessTable>) -> Self {
        Self {
            parent_pid,
            poll_interval,
            processes,
        }
    }

    /// Watch whatever process launched this one
    pub fn for_parent(poll_interval: Duration, processes: Arc<dyn ProcessTable>) -> Self {
        let parent_pid = processes.parent_pid();
        Self::new(parent_pid, poll_interval, processes)
    }

    pub fn parent_pid(&self) -> i32 {
        self.parent_pid
    }

    /// Poll until the parent disappears or `cancel` fires
    ///
    /// Returns `Err(ParentLost)` on the first failed check and `Ok(())` when
    /// cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SupervisorError> {
        if self.parent_pid <= 1 {
            warn!(pid = self.parent_pid, "Parent is init; the watchdog will never fire");
        }
        info!(
            pid = self.parent_pid,
            interval_secs = self.poll_interval.as_secs(),
            "Parent watchdog started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Parent watchdog stopped");
                    return Ok(());
                }
                _ = sleep(self.poll_interval) => {
                    if !self.processes.is_alive(self.parent_pid) {
                        error!(pid = self.parent_pid, "Parent process is gone, shutting down");
                        return Err(SupervisorError::ParentLost { pid: self.parent_pid });
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ParentWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentWatchdog")
            .field("parent_pid", &self.parent_pid)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
