// SPDX-License-Identifier: MPL-2.0

//! Camera Server - share one capture device over HTTP
//!
//! A single process owns the webcam. Clients pull a live multipart JPEG stream
//! or request one-off captures; the device is opened on demand and closed
//! again shortly after the last consumer leaves.
//!
//! # Architecture
//!
//! - [`backends`]: Capture backend traits, the device guard, V4L2 and virtual backends
//! - [`lifecycle`]: Session counting and deferred device shutdown
//! - [`singleton`]: Host-wide instance lock and parent-process watchdog
//! - [`service`]: Camera operations used by the HTTP layer
//! - [`server`]: axum routes
//! - [`supervisor`]: Process startup and shutdown
//! - [`config`]: Server configuration and per-user paths

pub mod backends;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod janitor;
pub mod lifecycle;
pub mod logging;
pub mod media;
pub mod server;
pub mod service;
pub mod singleton;
pub mod supervisor;

// Re-export commonly used types
pub use backends::camera::{CaptureBackend, DeviceGuard, Frame, OpenDevice, PixelFormat};
pub use config::ServerConfig;
pub use errors::{CameraError, LockError, SupervisorError};
pub use service::CameraService;
