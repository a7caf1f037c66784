//! Outer polling loop
//!
//! Idles on the link until the device reports motion, then hands control to
//! the session controller. Nothing a single session does can stop the loop;
//! only an operator shutdown does.

use crate::config::SessionConfig;
use crate::operator::{OperatorCommand, OperatorInbox};
use crate::session::{SessionController, SessionOutcome, SessionReport};
use gate_protocol::{Inbound, LinkChannel};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one loop iteration did
#[derive(Debug)]
pub enum LoopStep {
    /// Nothing to do, slept one poll period
    Idle,
    /// A trigger started a session, which has now finished
    Session(SessionReport),
    /// A line arrived that does not start a session
    Ignored(String),
    /// Operator asked to stop
    Shutdown,
}

/// Trigger listener and session dispatcher
pub struct MainLoop {
    controller: SessionController,
    link: Box<dyn LinkChannel>,
    operator: OperatorInbox,
    idle_poll: Duration,
    error_backoff: Duration,
    sessions: u64,
}

impl MainLoop {
    pub fn new(
        controller: SessionController,
        link: Box<dyn LinkChannel>,
        operator: OperatorInbox,
        policy: &SessionConfig,
    ) -> Self {
        if !link.is_attached() {
            warn!("No device link; triggers can only come from a simulated source");
        }

        Self {
            controller,
            link,
            operator,
            idle_poll: policy.idle_poll(),
            error_backoff: policy.error_backoff(),
            sessions: 0,
        }
    }

    /// Run until the operator asks to stop, then release everything
    pub async fn run(&mut self) {
        info!("[SYSTEM] Waiting for TRIGGER from device...");
        loop {
            if let LoopStep::Shutdown = self.step().await {
                break;
            }
        }
        self.shutdown();
    }

    /// One iteration: operator first, then at most one inbound line
    pub async fn step(&mut self) -> LoopStep {
        if let Some(OperatorCommand::AbortSession) = self.operator.try_next() {
            debug!("Abort requested with no session running");
        }
        if self.operator.shutdown_requested() {
            return LoopStep::Shutdown;
        }

        let Some(line) = self.link.try_receive() else {
            tokio::time::sleep(self.idle_poll).await;
            return LoopStep::Idle;
        };
        info!("[DEVICE] {}", line);

        match line.parse::<Inbound>() {
            Ok(Inbound::Trigger) => {
                self.sessions += 1;
                let report = self
                    .controller
                    .handle_trigger(self.link.as_mut(), &mut self.operator)
                    .await;

                if let SessionOutcome::Faulted {
                    unexpected: true, ..
                } = &report.outcome
                {
                    warn!("Backing off {:?} after unexpected fault", self.error_backoff);
                    tokio::time::sleep(self.error_backoff).await;
                }
                LoopStep::Session(report)
            }
            Ok(Inbound::Unlocked) => {
                debug!("UNLOCKED with no session running");
                LoopStep::Ignored(line)
            }
            Err(e) => {
                warn!("{}", e);
                LoopStep::Ignored(line)
            }
        }
    }

    /// Sessions started since the loop was created
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Terminal cleanup: camera first, then the link. Idempotent.
    pub fn shutdown(&mut self) {
        self.controller.release();
        self.link.close();
        info!("The system has been shut down.");
    }
}
