//! Camera Capture Library for the Presence Gate
//!
//! Provides the `FrameSource` seam the session controller drives:
//! - `ImageSequenceSource` replays still images from a directory
//! - `MockCamera` produces scripted frames for tests and simulation
//!
//! A source is opened once per session and closed on every exit path.

pub mod frame;
pub mod mock;
pub mod sequence;

pub use frame::VideoFrame;
pub use mock::{CameraProbe, MockCamera};
pub use sequence::ImageSequenceSource;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Unable to turn on the camera: {0}")]
    DeviceUnavailable(String),

    #[error("Unable to read image frame: {0}")]
    Read(String),

    #[error("Camera not opened")]
    NotOpen,
}

/// Camera configuration, passed through to the source at open time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device path or frame directory
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "frames".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// A live frame producer
///
/// `close` must be idempotent and safe on a source that was never opened.
pub trait FrameSource: Send {
    /// Acquire the device with the requested dimensions
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    /// Next frame in capture order
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Release the device
    fn close(&mut self);

    /// Whether the device is currently held
    fn is_open(&self) -> bool;
}
