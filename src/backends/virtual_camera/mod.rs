// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture backend
//!
//! Produces a moving RGB gradient without touching hardware. Used by
//! `--virtual` runs and by tests, which drive it through a
//! [`VirtualCameraProbe`] to count opens/closes and inject failures.

use crate::backends::camera::types::{Frame, PixelFormat};
use crate::backends::camera::{CaptureBackend, OpenDevice};
use crate::errors::{CameraError, CameraResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct ProbeState {
    open_attempts: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
    fail_opens: AtomicUsize,
    fail_reads: AtomicUsize,
    /// Currently open handles; never above one when the guard does its job
    open_now: AtomicUsize,
    max_open: AtomicUsize,
}

/// Observation and fault-injection handle shared with a [`VirtualCamera`]
#[derive(Debug, Clone, Default)]
pub struct VirtualCameraProbe {
    state: Arc<ProbeState>,
}

impl VirtualCameraProbe {
    pub fn open_attempts(&self) -> usize {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open handles observed
    pub fn max_concurrent_open(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.state.open_now.load(Ordering::SeqCst) > 0
    }

    /// Make the next `n` open attempts fail
    pub fn fail_next_opens(&self, n: usize) {
        self.state.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` reads fail
    pub fn fail_next_reads(&self, n: usize) {
        self.state.fail_reads.store(n, Ordering::SeqCst);
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Test-pattern capture backend
#[derive(Debug, Clone)]
pub struct VirtualCamera {
    width: u32,
    height: u32,
    read_delay: Duration,
    probe: VirtualCameraProbe,
}

impl VirtualCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            read_delay: Duration::ZERO,
            probe: VirtualCameraProbe::default(),
        }
    }

    /// Sleep this long in every read, roughly imitating a real frame rate
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn probe(&self) -> VirtualCameraProbe {
        self.probe.clone()
    }
}

impl CaptureBackend for VirtualCamera {
    fn open(&mut self) -> CameraResult<Box<dyn OpenDevice>> {
        let state = &self.probe.state;
        state.open_attempts.fetch_add(1, Ordering::SeqCst);

        if VirtualCameraProbe::take_one(&state.fail_opens) {
            return Err(CameraError::unavailable("virtual camera: injected open failure"));
        }

        state.opens.fetch_add(1, Ordering::SeqCst);
        let now = state.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_open.fetch_max(now, Ordering::SeqCst);
        debug!(width = self.width, height = self.height, "Virtual camera opened");

        Ok(Box::new(VirtualHandle {
            width: self.width,
            height: self.height,
            read_delay: self.read_delay,
            sequence: 0,
            closed: false,
            probe: self.probe.clone(),
        }))
    }

    fn name(&self) -> String {
        format!("virtual:{}x{}", self.width, self.height)
    }
}

struct VirtualHandle {
    width: u32,
    height: u32,
    read_delay: Duration,
    sequence: u64,
    closed: bool,
    probe: VirtualCameraProbe,
}

impl VirtualHandle {
    fn pattern(&self, shift: u64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                data.push(((x as u64 * 255 / w.max(1) as u64 + shift) % 256) as u8);
                data.push((y * 255 / h.max(1)) as u8);
                data.push((shift * 4 % 256) as u8);
            }
        }
        data
    }
}

impl OpenDevice for VirtualHandle {
    fn read_frame(&mut self) -> CameraResult<Frame> {
        let state = &self.probe.state;
        state.reads.fetch_add(1, Ordering::SeqCst);

        if self.closed {
            return Err(CameraError::read_failure("virtual camera is closed"));
        }
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        if VirtualCameraProbe::take_one(&state.fail_reads) {
            return Err(CameraError::read_failure("virtual camera: injected read failure"));
        }

        let shift = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Frame::new(
            self.width,
            self.height,
            PixelFormat::Rgb24,
            self.pattern(shift),
        ))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let state = &self.probe.state;
        state.closes.fetch_add(1, Ordering::SeqCst);
        state.open_now.fetch_sub(1, Ordering::SeqCst);
        debug!("Virtual camera closed");
    }
}

impl Drop for VirtualHandle {
    fn drop(&mut self) {
        self.close();
    }
}
