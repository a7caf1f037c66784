//! Classifier seam and the presence reduction

use crate::{ClassifierError, Detection, PresenceConfig};
use camera_capture::VideoFrame;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Frame to detections
///
/// Implementations may take arbitrarily long; the caller never runs two
/// `detect` calls at once.
pub trait Classifier: Send {
    /// Detect objects, dropping anything below `confidence_threshold`
    fn detect(
        &mut self,
        frame: &VideoFrame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, ClassifierError>;
}

/// True iff any detection is a human label at or above the threshold
pub fn presence_signal(detections: &[Detection], config: &PresenceConfig) -> bool {
    detections.iter().any(|d| {
        config.is_human_label(&d.label) && d.confidence >= config.confidence_threshold
    })
}

/// What the mock classifier reports for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    /// A person well above threshold
    Human,
    /// A person below any sensible threshold
    FaintHuman,
    /// A non-human object
    Object,
    /// Nothing at all
    Empty,
    /// Inference failure
    Fail,
}

impl FrameVerdict {
    fn detections(self) -> Result<Vec<Detection>, ClassifierError> {
        match self {
            FrameVerdict::Human => Ok(vec![Detection::new("person", 0.92)]),
            FrameVerdict::FaintHuman => Ok(vec![Detection::new("person", 0.05)]),
            FrameVerdict::Object => Ok(vec![Detection::new("chair", 0.88)]),
            FrameVerdict::Empty => Ok(Vec::new()),
            FrameVerdict::Fail => Err(ClassifierError::Inference("mock failure".into())),
        }
    }
}

/// Scripted classifier for tests and simulation
///
/// Plays back its script one verdict per frame, then repeats `idle`.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    script: VecDeque<FrameVerdict>,
    idle: FrameVerdict,
}

impl MockClassifier {
    /// Classifier that never sees anyone
    pub fn new() -> Self {
        info!("Creating mock classifier");
        Self {
            script: VecDeque::new(),
            idle: FrameVerdict::Empty,
        }
    }

    /// Play `script`, then report nothing
    pub fn scripted(script: impl IntoIterator<Item = FrameVerdict>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::new()
        }
    }

    /// Verdict once the script runs out
    pub fn then_repeat(mut self, verdict: FrameVerdict) -> Self {
        self.idle = verdict;
        self
    }

    /// Shorthand script: `H` human, `f` faint human, `o` object, `.` empty,
    /// `x` failure; other characters are skipped
    pub fn from_pattern(pattern: &str) -> Self {
        Self::scripted(pattern.chars().filter_map(|c| match c {
            'H' => Some(FrameVerdict::Human),
            'f' => Some(FrameVerdict::FaintHuman),
            'o' => Some(FrameVerdict::Object),
            '.' => Some(FrameVerdict::Empty),
            'x' => Some(FrameVerdict::Fail),
            _ => None,
        }))
    }

    /// Verdicts left in the script
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for MockClassifier {
    fn detect(
        &mut self,
        frame: &VideoFrame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, ClassifierError> {
        let verdict = self.script.pop_front().unwrap_or(self.idle);
        debug!("Mock verdict for frame {}: {:?}", frame.sequence, verdict);

        let mut detections = verdict.detections()?;
        detections.retain(|d| d.confidence >= confidence_threshold);
        Ok(detections)
    }
}
