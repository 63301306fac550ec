// SPDX-License-Identifier: GPL-3.0-only

//! JPEG encoding for captured frames

use crate::backends::camera::types::{Frame, PixelFormat};
use crate::errors::{CameraError, CameraResult};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Convert YUYV (YUV 4:2:2) to packed RGB
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    'outer: for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break 'outer;
            }
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb
}

/// Encode a captured frame as a standalone JPEG
///
/// MJPG frames are passed through untouched. Raw frames are converted to
/// RGB and compressed at `quality` (1-100).
pub fn encode_jpeg(frame: &Frame, quality: u8) -> CameraResult<Vec<u8>> {
    let rgb = match frame.format {
        PixelFormat::Mjpeg => {
            if !frame.data.starts_with(&JPEG_SOI) {
                return Err(CameraError::Encoding(
                    "MJPG frame is missing the JPEG start marker".into(),
                ));
            }
            return Ok(frame.data.to_vec());
        }
        PixelFormat::Yuyv => yuyv_to_rgb(&frame.data, frame.width, frame.height),
        PixelFormat::Rgb24 => frame.data.to_vec(),
    };

    let image = RgbImage::from_raw(frame.width, frame.height, rgb).ok_or_else(|| {
        CameraError::Encoding(format!(
            "{} frame of {} bytes is too short for {}x{}",
            frame.format,
            frame.len(),
            frame.width,
            frame.height
        ))
    })?;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&image)
        .map_err(|e| CameraError::Encoding(format!("Failed to encode JPEG: {}", e)))?;

    debug!(
        format = %frame.format,
        raw_size = frame.len(),
        jpeg_size = jpeg.len(),
        "Encoded frame as JPEG"
    );

    Ok(jpeg)
}
