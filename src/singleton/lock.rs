// SPDX-License-Identifier: GPL-3.0-only

//! Host-wide singleton lock
//!
//! An exclusive `flock(2)` on a well-known file, with the owner's pid written
//! inside. A newer instance asks a live previous owner to exit and waits for
//! the lock instead of giving up; a dead owner's record is simply reclaimed.

use super::process::ProcessTable;
use crate::constants::{LOCK_TAKEOVER_POLL, LOCK_TAKEOVER_TIMEOUT};
use crate::errors::{LockError, LockResult};
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Proof of ownership of the lock file
///
/// Released on drop.
#[derive(Debug)]
pub struct SingletonLock {
    path: PathBuf,
    file: Option<File>,
    owner: i32,
}

impl SingletonLock {
    /// Claim the lock at `path`, preempting a previous owner if needed
    pub fn acquire(path: &Path, processes: &dyn ProcessTable) -> LockResult<Self> {
        Self::acquire_with_timeout(path, processes, LOCK_TAKEOVER_TIMEOUT)
    }

    /// Like [`acquire`](Self::acquire) with an explicit takeover deadline
    pub fn acquire_with_timeout(
        path: &Path,
        processes: &dyn ProcessTable,
        timeout: Duration,
    ) -> LockResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let me = processes.current_pid();
        let deadline = Instant::now() + timeout;
        let mut holder = None;
        let mut signalled = false;

        loop {
            let file = open_lock_file(path)?;

            if try_flock(&file)? {
                if refers_to(&file, path)? {
                    return Self::claim(path, file, me, processes);
                }
                // The previous owner removed the file while we waited on it
                debug!(path = %path.display(), "Lock file replaced, retrying");
            } else {
                holder = read_owner(path);
                if !signalled {
                    match holder {
                        Some(pid) if pid != me && processes.is_alive(pid) => {
                            signalled = true;
                            info!(pid, "Another instance is running, asking it to exit");
                            if let Err(e) = processes.terminate(pid) {
                                warn!(pid, error = %e, "Failed to signal previous instance");
                            }
                        }
                        Some(pid) => {
                            signalled = true;
                            debug!(pid, "Lock held but recorded owner is not running");
                        }
                        // The holder may not have written its pid yet; look again next poll
                        None => debug!("Lock held with no readable owner"),
                    }
                }
            }

            if Instant::now() >= deadline {
                warn!(path = %path.display(), holder = ?holder, "Could not acquire singleton lock");
                return Err(LockError::LockContention {
                    path: path.to_path_buf(),
                    holder,
                });
            }
            std::thread::sleep(LOCK_TAKEOVER_POLL);
        }
    }

    fn claim(path: &Path, mut file: File, me: i32, processes: &dyn ProcessTable) -> LockResult<Self> {
        if let Some(previous) = read_owner(path)
            && previous != me
            && !processes.is_alive(previous)
        {
            info!(pid = previous, "Reclaiming lock from stale owner");
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", me)?;
        file.sync_all()?;

        info!(path = %path.display(), pid = me, "Singleton lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            owner: me,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid recorded in the lock file
    pub fn owner(&self) -> i32 {
        self.owner
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Delete the lock file and drop the lock
    ///
    /// Calling it again is a no-op.
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        // Unlink while still locked so no newcomer can lock the doomed inode
        match refers_to(&file, &self.path) {
            Ok(true) => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
                }
            }
            Ok(false) => debug!(path = %self.path.display(), "Lock file already replaced"),
            Err(e) => debug!(error = %e, "Lock file already gone"),
        }

        unsafe {
            libc::flock(file.as_raw_fd(), libc::LOCK_UN);
        }
        drop(file);
        info!(path = %self.path.display(), "Singleton lock released");
    }
}

impl Drop for SingletonLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pid recorded in the lock file at `path`, if any
pub fn read_owner(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path)
        .ok()?
        .trim()
        .parse()
        .ok()
        .filter(|pid: &i32| *pid > 0)
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Non-blocking exclusive lock; `Ok(false)` when someone else holds it
fn try_flock(file: &File) -> io::Result<bool> {
    loop {
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(code) if code == libc::EWOULDBLOCK => return Ok(false),
            _ => return Err(err),
        }
    }
}

/// Whether `path` still names the inode `file` has open
fn refers_to(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Process table where "terminating" the holder drops its lock
    #[derive(Default)]
    struct FakeProcesses {
        me: i32,
        alive: Mutex<HashSet<i32>>,
        terminated: Mutex<Vec<i32>>,
        holder: Mutex<Option<SingletonLock>>,
        stubborn: bool,
    }

    impl FakeProcesses {
        fn new(me: i32, alive: &[i32]) -> Self {
            Self {
                me,
                alive: Mutex::new(alive.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn terminated(&self) -> Vec<i32> {
            self.terminated.lock().unwrap().clone()
        }
    }

    impl ProcessTable for FakeProcesses {
        fn is_alive(&self, pid: i32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn terminate(&self, pid: i32) -> io::Result<()> {
            self.terminated.lock().unwrap().push(pid);
            if !self.stubborn {
                self.alive.lock().unwrap().remove(&pid);
                self.holder.lock().unwrap().take();
            }
            Ok(())
        }

        fn current_pid(&self) -> i32 {
            self.me
        }

        fn parent_pid(&self) -> i32 {
            1
        }
    }

    #[test]
    fn test_acquire_writes_pid_and_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");
        let processes = FakeProcesses::new(4242, &[4242]);

        let mut lock = SingletonLock::acquire(&path, &processes).unwrap();
        assert_eq!(read_owner(&path), Some(4242));
        assert_eq!(lock.owner(), 4242);

        lock.release();
        assert!(!path.exists());
        assert!(!lock.is_held());

        // Second release is a no-op
        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_live_holder_is_terminated_before_takeover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");

        let old = FakeProcesses::new(1000, &[1000]);
        let held = SingletonLock::acquire(&path, &old).unwrap();

        let new = FakeProcesses::new(2000, &[1000, 2000]);
        *new.holder.lock().unwrap() = Some(held);

        let lock = SingletonLock::acquire(&path, &new).unwrap();
        assert_eq!(new.terminated(), vec![1000]);
        assert_eq!(lock.owner(), 2000);
        assert_eq!(read_owner(&path), Some(2000));
    }

    #[test]
    fn test_stale_record_is_reclaimed_without_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");
        std::fs::write(&path, "31337\n").unwrap();

        let processes = FakeProcesses::new(2000, &[2000]);
        let lock = SingletonLock::acquire(&path, &processes).unwrap();

        assert!(processes.terminated().is_empty());
        assert_eq!(lock.owner(), 2000);
        assert_eq!(read_owner(&path), Some(2000));
    }

    #[test]
    fn test_holder_that_refuses_to_exit_is_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");

        let old = FakeProcesses::new(1000, &[1000]);
        let _held = SingletonLock::acquire(&path, &old).unwrap();

        let new = FakeProcesses {
            stubborn: true,
            ..FakeProcesses::new(2000, &[1000, 2000])
        };
        let err = SingletonLock::acquire_with_timeout(&path, &new, Duration::from_millis(300))
            .unwrap_err();

        match err {
            LockError::LockContention { holder, .. } => assert_eq!(holder, Some(1000)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(new.terminated(), vec![1000]);
        // Loser must not disturb the winner's record
        assert_eq!(read_owner(&path), Some(1000));
    }

    #[test]
    fn test_holder_is_signalled_once_its_pid_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");

        // Holder has the flock but has not written its pid yet
        let held_file = open_lock_file(&path).unwrap();
        assert!(try_flock(&held_file).unwrap());
        let held = SingletonLock {
            path: path.clone(),
            file: Some(held_file),
            owner: 1000,
        };

        let new = FakeProcesses::new(2000, &[1000, 2000]);
        *new.holder.lock().unwrap() = Some(held);

        let writer = {
            let path = path.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(250));
                std::fs::write(&path, "1000\n").unwrap();
            })
        };

        let lock = SingletonLock::acquire_with_timeout(&path, &new, Duration::from_secs(3))
            .unwrap();
        writer.join().unwrap();

        assert_eq!(new.terminated(), vec![1000]);
        assert_eq!(lock.owner(), 2000);
        assert_eq!(read_owner(&path), Some(2000));
    }

    #[test]
    fn test_garbage_record_reads_as_no_owner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");
        std::fs::write(&path, "not a pid").unwrap();
        assert_eq!(read_owner(&path), None);
        std::fs::write(&path, "-5").unwrap();
        assert_eq!(read_owner(&path), None);
    }
}
