// SPDX-License-Identifier: GPL-3.0-only

//! OS process table queries

use std::io;
use tracing::debug;

/// Process liveness and signalling
pub trait ProcessTable: Send + Sync {
    /// Whether `pid` names a running, non-zombie process
    fn is_alive(&self, pid: i32) -> bool;

    /// Ask `pid` to exit (SIGTERM on Unix)
    fn terminate(&self, pid: i32) -> io::Result<()>;

    fn current_pid(&self) -> i32;

    fn parent_pid(&self) -> i32;
}

/// The real process table, via `kill(2)` and `/proc`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl ProcessTable for SystemProcesses {
    fn is_alive(&self, pid: i32) -> bool {
        if pid <= 0 {
            return false;
        }

        // Signal 0 only checks existence and permissions
        let result = unsafe { libc::kill(pid, 0) };
        if result != 0 {
            let err = io::Error::last_os_error();
            // EPERM: exists but belongs to someone else
            if err.raw_os_error() != Some(libc::EPERM) {
                return false;
            }
        }

        match proc_state(pid) {
            Some('Z') | Some('X') => {
                debug!(pid, "Process is defunct");
                false
            }
            _ => true,
        }
    }

    fn terminate(&self, pid: i32) -> io::Result<()> {
        if pid <= 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal pid {}", pid),
            ));
        }
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn current_pid(&self) -> i32 {
        std::process::id() as i32
    }

    fn parent_pid(&self) -> i32 {
        unsafe { libc::getppid() }
    }
}

/// Scheduler state letter from `/proc/<pid>/stat`
///
/// Returns `None` when `/proc` is unavailable or the process vanished.
fn proc_state(pid: i32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    parse_stat_state(&stat)
}

/// The command name may contain spaces and parentheses, so the state is the
/// first field after the last `)`.
fn parse_stat_state(stat: &str) -> Option<char> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.trim_start().chars().next()
}
