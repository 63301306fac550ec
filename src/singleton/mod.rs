// SPDX-License-Identifier: GPL-3.0-only

//! Single-instance guarantees for the server process
//!
//! - [`SingletonLock`]: host-wide advisory lock; a newer launch preempts the
//!   running instance instead of refusing to start
//! - [`ParentWatchdog`]: ends the process once the launching parent is gone
//! - [`ProcessTable`]: the OS process queries both of them need

pub mod lock;
pub mod process;
pub mod watchdog;

pub use lock::SingletonLock;
pub use process::{ProcessTable, SystemProcesses};
pub use watchdog::ParentWatchdog;
