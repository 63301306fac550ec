// SPDX-License-Identifier: GPL-3.0-only

//! Server configuration
//!
//! Values come from defaults in [`crate::constants`], optionally overridden by a
//! JSON file and then by command-line flags.

use crate::constants::*;
use crate::errors::SupervisorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capture device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// V4L2 device node (e.g. `/dev/video0`)
    pub path: String,
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
    /// Warm-up delay applied after opening, in milliseconds
    pub warmup_ms: u64,
    /// JPEG quality used when frames must be re-encoded
    pub jpeg_quality: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_DEVICE_PATH.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            warmup_ms: DEFAULT_WARMUP.as_millis() as u64,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl DeviceSettings {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

/// Open/close policy for the shared device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Open devices idle longer than this are closed and reopened before use
    pub idle_timeout_secs: u64,
    /// Delay between the last streaming session ending and the device closing
    pub shutdown_grace_ms: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
        }
    }
}

impl LifecycleSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Parent process watchdog settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    /// Watch this pid instead of the real parent
    pub parent_pid: Option<i32>,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: DEFAULT_WATCHDOG_INTERVAL.as_secs(),
            parent_pid: None,
        }
    }
}

impl WatchdogSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Temp-file sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_JANITOR_INTERVAL.as_secs(),
            max_age_secs: DEFAULT_JANITOR_MAX_AGE.as_secs(),
        }
    }
}

impl JanitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address; `None` means the machine's LAN address
    pub host: Option<String>,
    pub port: u16,
    /// Root for images, logs and the lock file; `None` means the per-user cache dir
    pub base_dir: Option<PathBuf>,
    pub device: DeviceSettings,
    pub lifecycle: LifecycleSettings,
    pub watchdog: WatchdogSettings,
    pub janitor: JanitorSettings,
    /// Upper bound on cleanup once the process starts shutting down
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            base_dir: None,
            device: DeviceSettings::default(),
            lifecycle: LifecycleSettings::default(),
            watchdog: WatchdogSettings::default(),
            janitor: JanitorSettings::default(),
            shutdown_grace_ms: DEFAULT_PROCESS_SHUTDOWN_GRACE.as_millis() as u64,
        }
    }
}

impl ServerConfig {
    /// Load a configuration file, filling unspecified fields with defaults
    pub fn load(path: &Path) -> Result<Self, SupervisorError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| SupervisorError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Resolved application paths
    pub fn paths(&self) -> AppPaths {
        match &self.base_dir {
            Some(dir) => AppPaths::new(dir.clone()),
            None => AppPaths::user_default(),
        }
    }
}

/// Per-user filesystem layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub base: PathBuf,
}

impl AppPaths {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// `<cache dir>/camera-server`, falling back to the home directory
    pub fn user_default() -> Self {
        let root = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(root.join(APP_DIR_NAME))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.base.join("images")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.base.join(LOCK_FILE_NAME)
    }

    pub fn capture_file(&self) -> PathBuf {
        self.images_dir().join(CAPTURE_FILE_NAME)
    }

    /// Create the directories the server writes into
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.images_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
