// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera server

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for device operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Result type alias for singleton lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Capture device errors
///
/// Every variant is recoverable at the request level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// Opening (or re-opening) the device failed: hardware absent or busy
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
    /// A frame grab failed on an otherwise open device
    #[error("Frame read failed: {0}")]
    ReadFailure(String),
    /// The device was force-shut down and has not been re-enabled
    #[error("Camera shutdown in progress")]
    ShutdownInProgress,
    /// Converting a captured frame to JPEG failed
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

impl CameraError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    pub fn read_failure(msg: impl Into<String>) -> Self {
        Self::ReadFailure(msg.into())
    }
}

/// Errors from a capture that is written to disk
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("Failed to store capture: {0}")]
    Io(#[from] std::io::Error),
}

/// Singleton lock errors
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is still held after trying to preempt the previous owner
    #[error("Lock {} is held by another instance (pid {holder:?})", .path.display())]
    LockContention {
        path: PathBuf,
        holder: Option<i32>,
    },
    /// Filesystem error while creating, locking or writing the lock file
    #[error("Lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-level errors
///
/// `ParentLost` is the only one that ends the process on purpose.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The process that launched this server is gone
    #[error("Parent process {pid} exited")]
    ParentLost { pid: i32 },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_display() {
        let err = CameraError::unavailable("/dev/video0 busy");
        assert_eq!(err.to_string(), "Camera unavailable: /dev/video0 busy");
        assert_eq!(
            CameraError::ShutdownInProgress.to_string(),
            "Camera shutdown in progress"
        );
    }

    #[test]
    fn test_lock_contention_mentions_holder() {
        let err = LockError::LockContention {
            path: PathBuf::from("/tmp/x.lock"),
            holder: Some(42),
        };
        let text = err.to_string();
        assert!(text.contains("/tmp/x.lock"));
        assert!(text.contains("42"));
    }

    #[test]
    fn test_lock_error_into_supervisor_error() {
        let err: SupervisorError = LockError::Io(std::io::Error::other("boom")).into();
        assert!(matches!(err, SupervisorError::Lock(_)));
    }
}
