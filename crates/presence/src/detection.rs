//! Detection records

use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One object reported by a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class name as reported by the model
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    /// Detection without a box
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox: None,
        }
    }

    /// Attach a bounding box
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}
