// SPDX-License-Identifier: MPL-2.0

//! Media processing utilities
//!
//! Frames leave the device as MJPG or raw YUYV. Everything served over HTTP
//! is JPEG, so the [`jpeg`] module turns any captured [`Frame`](crate::backends::camera::Frame)
//! into a standalone JPEG image. Conversion always runs outside the device
//! guard's critical section.

pub mod jpeg;

pub use jpeg::{encode_jpeg, yuyv_to_rgb};
