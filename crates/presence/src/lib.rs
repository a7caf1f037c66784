//! Human Presence Check
//!
//! Turns per-frame classifier output into a single reliable verdict:
//! - `Classifier` maps a frame to labelled detections
//! - `presence_signal` reduces detections to "human in this frame"
//! - `PresenceDebouncer` confirms after N consecutive positive frames

pub mod classifier;
pub mod config;
pub mod debouncer;
pub mod detection;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::{presence_signal, Classifier, FrameVerdict, MockClassifier};
pub use config::PresenceConfig;
pub use debouncer::PresenceDebouncer;
pub use detection::{BoundingBox, Detection};
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

use thiserror::Error;

/// Classifier error types
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}
