//! Consecutive-frame debouncer
//!
//! Single-frame classifier noise must not flip the verdict: presence is only
//! confirmed after `required_frames` positive frames in a row.

/// Debouncer over per-frame presence signals
#[derive(Debug, Clone)]
pub struct PresenceDebouncer {
    required_frames: u32,
    consecutive_hits: u32,
}

impl PresenceDebouncer {
    /// A requirement of 0 frames is treated as 1
    pub fn new(required_frames: u32) -> Self {
        Self {
            required_frames: required_frames.max(1),
            consecutive_hits: 0,
        }
    }

    /// Feed one frame's signal. Returns `true` only on the frame where the
    /// run of hits reaches the requirement; a miss starts a new cycle.
    pub fn observe(&mut self, signal: bool) -> bool {
        if signal {
            self.consecutive_hits = self.consecutive_hits.saturating_add(1);
            self.consecutive_hits == self.required_frames
        } else {
            self.consecutive_hits = 0;
            false
        }
    }

    pub fn reset(&mut self) {
        self.consecutive_hits = 0;
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits
    }

    pub fn required_frames(&self) -> u32 {
        self.required_frames
    }
}
