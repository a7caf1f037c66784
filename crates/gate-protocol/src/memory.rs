//! In-memory link for tests and simulation

use crate::link::LinkChannel;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct MemoryState {
    inbound: VecDeque<String>,
    sent: Vec<String>,
    replies: HashMap<String, String>,
    closed: bool,
}

/// Link whose device side is driven by the caller
///
/// Clones share state: keep one clone to inject lines and inspect what the
/// controller sent, hand the other to the controller.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulate the device answering `sent` with `reply`
    pub fn with_auto_reply(self, sent: &str, reply: &str) -> Self {
        self.lock().replies.insert(sent.to_string(), reply.to_string());
        self
    }

    /// Queue a line as if the device had written it
    pub fn push_inbound(&self, line: &str) {
        self.lock().inbound.push_back(line.trim().to_string());
    }

    /// Every line sent so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// How many times `line` was sent
    pub fn sent_count(&self, line: &str) -> usize {
        self.lock().sent.iter().filter(|s| *s == line).count()
    }

    /// Lines queued but not yet received
    pub fn pending(&self) -> usize {
        self.lock().inbound.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LinkChannel for MemoryLink {
    fn send_line(&mut self, line: &str) {
        let mut state = self.lock();
        if state.closed {
            debug!("Memory link closed, dropped {}", line);
            return;
        }
        info!("[SEND] {}", line);
        state.sent.push(line.to_string());
        if let Some(reply) = state.replies.get(line).cloned() {
            state.inbound.push_back(reply);
        }
    }

    fn try_receive(&mut self) -> Option<String> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.inbound.pop_front()
    }

    fn is_attached(&self) -> bool {
        !self.lock().closed
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}
