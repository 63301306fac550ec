// SPDX-License-Identifier: GPL-3.0-only

//! Command-line flags
//!
//! Flags override values loaded from `--config`, which override built-in
//! defaults.

use camera_server::backends::camera::{CaptureBackend, V4l2Backend};
use camera_server::backends::virtual_camera::VirtualCamera;
use camera_server::config::ServerConfig;
use camera_server::constants::VIRTUAL_FRAME_INTERVAL;
use camera_server::errors::SupervisorError;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "camera-server")]
#[command(about = "Share one camera between live-stream and snapshot clients over HTTP")]
#[command(version = env!("GIT_VERSION"))]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind (default: this machine's LAN address)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// V4L2 device node
    #[arg(short, long)]
    pub device: Option<String>,

    /// Close and reopen the camera after this many idle seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Watch this pid instead of the parent process
    #[arg(long)]
    pub parent_pid: Option<i32>,

    /// Keep running when the parent process exits
    #[arg(long)]
    pub no_watchdog: bool,

    /// Directory for images, logs and the lock file
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Serve a generated test pattern instead of a real camera
    #[arg(long = "virtual")]
    pub virtual_camera: bool,
}

impl Cli {
    /// Load the config file, if any, and apply flag overrides
    pub fn load_config(&self) -> Result<ServerConfig, SupervisorError> {
        let config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = &self.host {
            config.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(device) = &self.device {
            config.device.path = device.clone();
        }
        if let Some(secs) = self.idle_timeout {
            config.lifecycle.idle_timeout_secs = secs;
        }
        if let Some(pid) = self.parent_pid {
            config.watchdog.parent_pid = Some(pid);
        }
        if self.no_watchdog {
            config.watchdog.enabled = false;
        }
        if let Some(dir) = &self.base_dir {
            config.base_dir = Some(dir.clone());
        }
        config
    }

    pub fn backend(&self, config: &ServerConfig) -> Box<dyn CaptureBackend> {
        if self.virtual_camera {
            Box::new(
                VirtualCamera::new(config.device.width, config.device.height)
                    .with_read_delay(VIRTUAL_FRAME_INTERVAL),
            )
        } else {
            Box::new(V4l2Backend::new(&config.device))
        }
    }
}
