//! Operator controls
//!
//! The operator can abort the running session (camera released, no verdict,
//! no cooldown) or stop the whole process.

use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// End the current session and return to idle
    AbortSession,
    /// Abort any session and stop the main loop
    Shutdown,
}

/// Sending side, cheap to clone into signal handlers
#[derive(Debug, Clone)]
pub struct OperatorHandle {
    tx: mpsc::UnboundedSender<OperatorCommand>,
}

impl OperatorHandle {
    pub fn abort_session(&self) {
        let _ = self.tx.send(OperatorCommand::AbortSession);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(OperatorCommand::Shutdown);
    }
}

/// Receiving side, polled by the main loop and the session controller
#[derive(Debug)]
pub struct OperatorInbox {
    rx: mpsc::UnboundedReceiver<OperatorCommand>,
    shutdown: bool,
}

impl OperatorInbox {
    /// Next pending command, if any. A shutdown is latched.
    pub fn try_next(&mut self) -> Option<OperatorCommand> {
        let command = self.rx.try_recv().ok()?;
        if command == OperatorCommand::Shutdown && !self.shutdown {
            info!("[EXIT] Manual stop");
            self.shutdown = true;
        }
        Some(command)
    }

    /// Whether a shutdown has been seen
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }
}

/// Create a connected handle/inbox pair
pub fn channel() -> (OperatorHandle, OperatorInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OperatorHandle { tx },
        OperatorInbox {
            rx,
            shutdown: false,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order_and_shutdown_latches() {
        let (handle, mut inbox) = channel();
        handle.abort_session();
        handle.shutdown();

        assert_eq!(inbox.try_next(), Some(OperatorCommand::AbortSession));
        assert!(!inbox.shutdown_requested());
        assert_eq!(inbox.try_next(), Some(OperatorCommand::Shutdown));
        assert!(inbox.try_next().is_none());
        assert!(inbox.shutdown_requested());
    }

    #[test]
    fn test_dropped_handle_is_not_shutdown() {
        let (handle, mut inbox) = channel();
        drop(handle);
        assert!(inbox.try_next().is_none());
        assert!(!inbox.shutdown_requested());
    }
}
