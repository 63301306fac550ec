// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture backend
//!
//! Opens a `/dev/videoN` node, negotiates MJPG (falling back to YUYV) and
//! streams through memory-mapped buffers.

use super::types::{Frame, PixelFormat};
use super::{CaptureBackend, OpenDevice};
use crate::config::DeviceSettings;
use crate::constants::V4L2_BUFFER_COUNT;
use crate::errors::{CameraError, CameraResult};
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// Formats tried in order of preference
const PREFERRED_FORMATS: [PixelFormat; 2] = [PixelFormat::Mjpeg, PixelFormat::Yuyv];

/// Backend for a single V4L2 device node
#[derive(Debug, Clone)]
pub struct V4l2Backend {
    path: String,
    width: u32,
    height: u32,
    warmup: Duration,
}

impl V4l2Backend {
    pub fn new(settings: &DeviceSettings) -> Self {
        Self {
            path: settings.path.clone(),
            width: settings.width,
            height: settings.height,
            warmup: settings.warmup(),
        }
    }

    fn negotiate(&self, dev: &Device) -> CameraResult<(Format, PixelFormat)> {
        for wanted in PREFERRED_FORMATS {
            let request = Format::new(self.width, self.height, FourCC::new(&wanted.fourcc()));
            match dev.set_format(&request) {
                Ok(actual) if actual.fourcc == request.fourcc => return Ok((actual, wanted)),
                Ok(actual) => {
                    debug!(
                        path = %self.path,
                        requested = %wanted,
                        got = ?actual.fourcc,
                        "Driver substituted pixel format"
                    );
                }
                Err(e) => {
                    debug!(path = %self.path, format = %wanted, error = %e, "set_format failed");
                }
            }
        }

        Err(CameraError::unavailable(format!(
            "{}: neither MJPG nor YUYV is supported",
            self.path
        )))
    }
}

impl CaptureBackend for V4l2Backend {
    fn open(&mut self) -> CameraResult<Box<dyn OpenDevice>> {
        info!(path = %self.path, width = self.width, height = self.height, "Opening V4L2 device");

        let dev = Device::with_path(&self.path)
            .map_err(|e| CameraError::unavailable(format!("{}: {}", self.path, e)))?;

        let (format, pixel_format) = self.negotiate(&dev)?;
        info!(
            path = %self.path,
            width = format.width,
            height = format.height,
            format = %pixel_format,
            "V4L2 format configured"
        );

        let stream = Stream::with_buffers(&dev, Type::VideoCapture, V4L2_BUFFER_COUNT)
            .map_err(|e| CameraError::unavailable(format!("Failed to create stream: {}", e)))?;

        let mut handle = V4l2Handle {
            path: self.path.clone(),
            width: format.width,
            height: format.height,
            format: pixel_format,
            stream: Some(stream),
            device: Some(dev),
        };

        // First frames after STREAMON are frequently black or torn
        if !self.warmup.is_zero() {
            std::thread::sleep(self.warmup);
        }
        if let Err(e) = handle.read_frame() {
            warn!(path = %self.path, error = %e, "Warm-up frame failed");
        }

        Ok(Box::new(handle))
    }

    fn name(&self) -> String {
        self.path.clone()
    }
}

/// An open V4L2 stream
struct V4l2Handle {
    path: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    stream: Option<Stream<'static>>,
    /// Dropped after the stream so STREAMOFF runs on a valid fd
    device: Option<Device>,
}

impl OpenDevice for V4l2Handle {
    fn read_frame(&mut self) -> CameraResult<Frame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::read_failure("stream is closed"))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::read_failure(format!("{}: {}", self.path, e)))?;

        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Err(CameraError::read_failure("driver returned an empty buffer"));
        }

        Ok(Frame::new(
            self.width,
            self.height,
            self.format,
            buf[..used].to_vec(),
        ))
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!(path = %self.path, "V4L2 stream stopped");
        }
        self.device.take();
    }
}

impl Drop for V4l2Handle {
    fn drop(&mut self) {
        self.close();
    }
}
