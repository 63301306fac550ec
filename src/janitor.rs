// SPDX-License-Identifier: GPL-3.0-only

//! Periodic removal of abandoned temporary capture files
//!
//! Captures are written to `<name>.tmp-<uuid>` and renamed into place. A crash
//! between the two leaves the temporary behind; this sweep cleans them up.

use crate::config::JanitorSettings;
use crate::constants::TEMP_FILE_MARKER;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Remove temporary files in `dir` last modified more than `max_age` ago
///
/// Returns how many files were removed. Per-file failures are logged and
/// skipped.
pub fn sweep(dir: &Path, max_age: Duration) -> io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().contains(TEMP_FILE_MARKER) {
            continue;
        }

        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale temp file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
        }
    }

    Ok(removed)
}

/// Sweep `dir` every `settings.interval()` until cancelled
pub async fn run(dir: PathBuf, settings: JanitorSettings, cancel: CancellationToken) {
    info!(
        dir = %dir.display(),
        interval_secs = settings.interval().as_secs(),
        "Temp file janitor started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(settings.interval()) => {}
        }

        let target = dir.clone();
        let max_age = settings.max_age();
        match tokio::task::spawn_blocking(move || sweep(&target, max_age)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => info!(count, "Cleaned up stale temp files"),
            Ok(Err(e)) => warn!(dir = %dir.display(), error = %e, "Temp file sweep failed"),
            Err(e) => warn!(error = %e, "Temp file sweep panicked"),
        }
    }

    debug!("Temp file janitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn test_sweep_removes_only_old_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let old_tmp = touch(dir.path(), "captured.jpg.tmp-1", Duration::from_secs(1000));
        let fresh_tmp = touch(dir.path(), "captured.jpg.tmp-2", Duration::ZERO);
        let old_capture = touch(dir.path(), "captured.jpg", Duration::from_secs(1000));

        let removed = sweep(dir.path(), Duration::from_secs(300)).unwrap();

        assert_eq!(removed, 1);
        assert!(!old_tmp.exists());
        assert!(fresh_tmp.exists());
        assert!(old_capture.exists());
    }

    #[test]
    fn test_sweep_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sweep(&dir.path().join("nope"), Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        run(dir.path().to_path_buf(), JanitorSettings::default(), cancel).await;
    }
}
