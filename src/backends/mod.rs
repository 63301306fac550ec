// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for frame capture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              CameraService                   │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────────┐  ┌──────────────────┐  │
//! │  │  Camera (V4L2)  │  │ Virtual Camera   │  │
//! │  │  + DeviceGuard  │  │ (test pattern)   │  │
//! │  └─────────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Backend traits, the device guard and the V4L2 implementation
//! - [`virtual_camera`]: Hardware-free backend for tests and demos

pub mod camera;
pub mod virtual_camera;
