// SPDX-License-Identifier: MPL-2.0

//! Capture device abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  HTTP / CameraService│
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │     DeviceGuard     │  ← Mutual exclusion, idle recycling, shutdown flag
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureBackend Trait│  ← open / read / close
//! └──────────┬──────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐  ┌─────────┐
//!   │ V4L2 │  │ Virtual │
//!   └──────┘  └─────────┘
//! ```
//!
//! Backends do no locking of their own. [`DeviceGuard`] serializes every call.

pub mod guard;
pub mod types;
pub mod v4l2;

pub use guard::DeviceGuard;
pub use types::*;
pub use v4l2::V4l2Backend;

use crate::errors::CameraResult;

/// Something that can open the physical capture device
pub trait CaptureBackend: Send {
    /// Open the device and wait out its warm-up period
    ///
    /// # Returns
    /// * `Ok(handle)` - Device is streaming and ready for reads
    /// * `Err(CameraError::DeviceUnavailable)` - Hardware absent or busy
    fn open(&mut self) -> CameraResult<Box<dyn OpenDevice>>;

    /// Human-readable device name for logging
    fn name(&self) -> String;
}

/// An open device handle
///
/// Owned exclusively by [`DeviceGuard`]; never handed out to callers.
pub trait OpenDevice: Send {
    /// Grab the next frame
    fn read_frame(&mut self) -> CameraResult<Frame>;

    /// Release the device. Calling it again is a no-op.
    fn close(&mut self);
}
