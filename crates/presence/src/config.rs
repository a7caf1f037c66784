//! Presence check configuration

use serde::{Deserialize, Serialize};

/// Presence check configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Minimum confidence for a detection to count
    pub confidence_threshold: f32,

    /// Labels treated as evidence of a human (matched case-insensitively)
    pub human_labels: Vec<String>,

    /// Consecutive positive frames needed to confirm presence
    pub required_frames: u32,

    /// ONNX model path (only used with the `onnx` feature)
    pub model_path: Option<String>,

    /// Square model input size in pixels
    pub model_input_size: u32,

    /// Class names in model output order
    pub class_names: Vec<String>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            human_labels: vec!["person".into(), "human".into(), "face".into()],
            required_frames: 3,
            model_path: None,
            model_input_size: 640,
            class_names: vec!["face".into()],
        }
    }
}

impl PresenceConfig {
    /// Trim and lower-case the human-label set, dropping blank entries
    pub fn normalize_labels(&mut self) {
        self.human_labels = self
            .human_labels
            .iter()
            .map(|label| label.trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
    }

    /// Whether a classifier label belongs to the human-label set
    pub fn is_human_label(&self, label: &str) -> bool {
        let label = label.trim();
        self.human_labels
            .iter()
            .any(|human| human.trim().eq_ignore_ascii_case(label))
    }
}
