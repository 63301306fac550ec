// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Directory name under the per-user cache directory
pub const APP_DIR_NAME: &str = "camera-server";

/// Singleton lock file name inside the application directory
pub const LOCK_FILE_NAME: &str = "camera_server.lock";

/// Log file name inside `<app dir>/logs`
pub const LOG_FILE_NAME: &str = "camera_server.log";

/// File name of the most recent single capture
pub const CAPTURE_FILE_NAME: &str = "captured.jpg";

/// File name offered to clients downloading the last capture
pub const CAPTURE_DOWNLOAD_NAME: &str = "captured_image.jpg";

/// Marker embedded in temporary capture files before they are renamed
pub const TEMP_FILE_MARKER: &str = ".tmp-";

/// Multipart boundary used by the live frame stream
pub const STREAM_BOUNDARY: &str = "frame";

/// Default V4L2 capture device
pub const DEFAULT_DEVICE_PATH: &str = "/dev/video0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5000;

/// Default requested capture resolution
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Default JPEG quality for YUYV frames that need re-encoding
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Number of memory-mapped buffers requested from the driver
pub const V4L2_BUFFER_COUNT: u32 = 4;

/// Open devices idle longer than this are recycled before the next read
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between the last session ending and the device being closed
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Settle time after opening; first frames from real hardware are often garbage
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(1);

/// Parent liveness poll interval
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

/// Temp-file sweep interval
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(600);

/// Temp files younger than this are left alone by the sweep
pub const DEFAULT_JANITOR_MAX_AGE: Duration = Duration::from_secs(300);

/// Upper bound on the cleanup phase once process shutdown starts
pub const DEFAULT_PROCESS_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// How long a newer instance waits for the previous owner to exit
pub const LOCK_TAKEOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll step used while waiting on a previous lock owner
pub const LOCK_TAKEOVER_POLL: Duration = Duration::from_millis(100);

/// Pause before a streaming session retries after a failed frame read
pub const STREAM_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Frame interval of the virtual camera (~30 fps)
pub const VIRTUAL_FRAME_INTERVAL: Duration = Duration::from_millis(33);
