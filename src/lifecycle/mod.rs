// SPDX-License-Identifier: GPL-3.0-only

//! Idle management for the shared device
//!
//! Streaming consumers register with a [`SessionCounter`]. When the last one
//! leaves, the [`DeferredShutdownScheduler`] waits out a grace period and
//! closes the device only if nobody came back in the meantime.

pub mod deferred;
pub mod sessions;

pub use deferred::DeferredShutdownScheduler;
pub use sessions::{SessionCounter, SessionGuard};
