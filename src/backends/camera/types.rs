// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for capture backends

use std::sync::Arc;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Motion-JPEG: each frame is already a complete JPEG image
    Mjpeg,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    /// Common raw format from webcam sensors
    Yuyv,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    Rgb24,
}

impl PixelFormat {
    /// V4L2 FourCC code for this format
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Mjpeg => *b"MJPG",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Rgb24 => *b"RGB3",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Mjpeg => write!(f, "MJPG"),
            PixelFormat::Yuyv => write!(f, "YUYV"),
            PixelFormat::Rgb24 => write!(f, "RGB24"),
        }
    }
}

/// A single frame copied out of the driver's buffers
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Pixel data (or a complete JPEG for [`PixelFormat::Mjpeg`])
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data: Arc::from(data.into_boxed_slice()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Snapshot of the device guard's state, for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub open: bool,
    pub shutdown_requested: bool,
    /// Number of successful opens since start
    pub open_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_codes() {
        assert_eq!(&PixelFormat::Mjpeg.fourcc(), b"MJPG");
        assert_eq!(&PixelFormat::Yuyv.fourcc(), b"YUYV");
        assert_eq!(PixelFormat::Rgb24.to_string(), "RGB24");
    }

    #[test]
    fn test_frame_debug_hides_pixels() {
        let frame = Frame::new(2, 1, PixelFormat::Rgb24, vec![0; 6]);
        let text = format!("{:?}", frame);
        assert!(text.contains("bytes: 6"));
        assert_eq!(frame.len(), 6);
    }
}
