//! Scripted camera for tests and simulation

use crate::{CameraConfig, CameraError, FrameSource, VideoFrame};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct ProbeCounters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    frames: AtomicUsize,
    open: AtomicBool,
}

/// Shared view of a `MockCamera`, kept by a test after the camera itself has
/// been handed to the controller
#[derive(Debug, Clone, Default)]
pub struct CameraProbe {
    inner: Arc<ProbeCounters>,
}

impl CameraProbe {
    /// Successful opens
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Closes that actually released an open device
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Frames handed out over the camera's lifetime
    pub fn frames(&self) -> usize {
        self.inner.frames.load(Ordering::SeqCst)
    }

    /// Whether the camera is held right now
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }
}

/// Mock camera producing blank frames
#[derive(Debug, Default)]
pub struct MockCamera {
    probe: CameraProbe,
    /// Remaining opens that will fail
    open_failures: usize,
    /// Per-session frame index whose read fails
    read_failure_at: Option<u32>,
    sequence: u32,
    width: u32,
    height: u32,
    open: bool,
}

impl MockCamera {
    /// Create a mock camera that always opens and always reads
    pub fn new() -> Self {
        info!("Creating mock camera");
        Self::default()
    }

    /// Camera whose device is missing
    pub fn unavailable() -> Self {
        Self::new().with_open_failures(usize::MAX)
    }

    /// Fail the next `count` opens
    pub fn with_open_failures(mut self, count: usize) -> Self {
        self.open_failures = count;
        self
    }

    /// Fail the read of the `index`-th frame (0-based) of every session
    pub fn with_read_failure_at(mut self, index: u32) -> Self {
        self.read_failure_at = Some(index);
        self
    }

    /// Counters that stay readable after the camera is moved
    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }
}

impl FrameSource for MockCamera {
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        if self.open_failures > 0 {
            self.open_failures -= 1;
            return Err(CameraError::DeviceUnavailable(config.device.clone()));
        }

        self.open = true;
        self.sequence = 0;
        self.width = config.width;
        self.height = config.height;
        self.probe.inner.opens.fetch_add(1, Ordering::SeqCst);
        self.probe.inner.open.store(true, Ordering::SeqCst);
        debug!("Mock camera opened at {}x{}", self.width, self.height);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if !self.open {
            return Err(CameraError::NotOpen);
        }
        if self.read_failure_at == Some(self.sequence) {
            return Err(CameraError::Read(format!(
                "mock failure at frame {}",
                self.sequence
            )));
        }

        let frame = VideoFrame::blank(self.width, self.height, self.sequence);
        self.sequence += 1;
        self.probe.inner.frames.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.probe.inner.closes.fetch_add(1, Ordering::SeqCst);
            self.probe.inner.open.store(false, Ordering::SeqCst);
            debug!("Mock camera closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
