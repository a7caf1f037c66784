//! Session state machine
//!
//! ```text
//! Idle -> Armed -> Deciding -> Unlocking -> Cooldown -> Idle
//!                           -> Denying   -> Cooldown -> Idle
//! ```
//!
//! A session starts on `TRIGGER`, owns the camera until it ends, and ends
//! through exactly one outcome. Faults and operator aborts skip the cooldown.

use crate::config::{GateConfig, SessionConfig};
use crate::operator::OperatorInbox;
use camera_capture::{CameraConfig, FrameSource};
use chrono::{DateTime, Utc};
use gate_protocol::{Inbound, LinkChannel, Outbound};
use presence::{presence_signal, Classifier, PresenceConfig, PresenceDebouncer};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for a trigger, camera closed
    #[default]
    Idle,
    /// Trigger accepted, camera opening
    Armed,
    /// Classifying frames
    Deciding,
    /// Device reported the unlock
    Unlocking,
    /// Auth timeout expired
    Denying,
    /// Quiet period, triggers ignored
    Cooldown,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Device confirmed the unlock
    Unlocked,
    /// Timeout expired; `DENIED` was sent
    TimedOut,
    /// Timeout expired after `APPROVED` with no unlock, and denying after
    /// approval is disabled; nothing further was sent
    ApprovalExpired,
    /// Camera failed to open; `DENIED` was sent
    DeviceUnavailable,
    /// Frame read or classification failed; nothing was sent
    Faulted { reason: String, unexpected: bool },
    /// Operator ended the session
    Aborted,
}

impl SessionOutcome {
    /// Authorization outcomes cool down, local faults and aborts do not
    pub fn requires_cooldown(&self) -> bool {
        matches!(
            self,
            SessionOutcome::Unlocked | SessionOutcome::TimedOut | SessionOutcome::ApprovalExpired
        )
    }

    /// Whether this outcome sent `DENIED`
    pub fn denied(&self) -> bool {
        matches!(
            self,
            SessionOutcome::TimedOut | SessionOutcome::DeviceUnavailable
        )
    }

    fn terminal_phase(&self) -> Phase {
        match self {
            SessionOutcome::Unlocked => Phase::Unlocking,
            SessionOutcome::TimedOut | SessionOutcome::ApprovalExpired => Phase::Denying,
            _ => Phase::Idle,
        }
    }
}

/// Summary of one finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
    /// Frames read from the camera
    pub frames: u32,
    /// Zero-based index of the frame that triggered `APPROVED`
    pub approved_at_frame: Option<u32>,
    /// Trigger to end of decision, cooldown excluded
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn approved(&self) -> bool {
        self.approved_at_frame.is_some()
    }
}

/// The one live session state
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Phase,
    session_start: Option<Instant>,
    debouncer: PresenceDebouncer,
    confirmed: bool,
}

impl SessionState {
    pub fn new(required_frames: u32) -> Self {
        Self {
            phase: Phase::Idle,
            session_start: None,
            debouncer: PresenceDebouncer::new(required_frames),
            confirmed: false,
        }
    }

    /// Start deciding from `now`
    pub fn begin(&mut self, now: Instant) {
        self.phase = Phase::Deciding;
        self.session_start = Some(now);
        self.debouncer.reset();
        self.confirmed = false;
    }

    /// Feed one frame; returns `true` exactly once per session, on the frame
    /// that first confirms presence
    pub fn observe(&mut self, signal: bool) -> bool {
        if self.debouncer.observe(signal) && !self.confirmed {
            self.confirmed = true;
            return true;
        }
        false
    }

    /// Expiry is inclusive: elapsed == timeout is expired
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.session_start
            .map(|start| now.saturating_duration_since(start) >= timeout)
            .unwrap_or(false)
    }

    /// Back to idle, dropping all per-session data
    pub fn clear(&mut self) {
        self.phase = Phase::Idle;
        self.session_start = None;
        self.debouncer.reset();
        self.confirmed = false;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_start(&self) -> Option<Instant> {
        self.session_start
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.debouncer.consecutive_hits()
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }
}

/// Camera held for the duration of a session; closed on drop so every exit
/// path, including a dropped future, releases the device
struct OpenCamera<'a> {
    source: &'a mut dyn FrameSource,
}

impl Drop for OpenCamera<'_> {
    fn drop(&mut self) {
        if self.source.is_open() {
            self.source.close();
            debug!("Camera released");
        }
    }
}

/// Drives one session per trigger
pub struct SessionController {
    camera: Box<dyn FrameSource>,
    classifier: Box<dyn Classifier>,
    camera_config: CameraConfig,
    presence: PresenceConfig,
    policy: SessionConfig,
    state: SessionState,
}

impl SessionController {
    /// Create a controller around the two external collaborators
    pub fn new(
        camera: Box<dyn FrameSource>,
        classifier: Box<dyn Classifier>,
        config: &GateConfig,
    ) -> Self {
        info!(
            "Session controller: {} frames to confirm, {}s timeout, {}s cooldown",
            config.presence.required_frames,
            config.session.auth_timeout_secs,
            config.session.cooldown_secs
        );

        Self {
            camera,
            classifier,
            camera_config: config.camera.clone(),
            presence: config.presence.clone(),
            policy: config.session.clone(),
            state: SessionState::new(config.presence.required_frames),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn policy(&self) -> &SessionConfig {
        &self.policy
    }

    /// Run a full session for one trigger, cooldown included
    pub async fn handle_trigger(
        &mut self,
        link: &mut dyn LinkChannel,
        operator: &mut OperatorInbox,
    ) -> SessionReport {
        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id);
        self.run_session(id, link, operator).instrument(span).await
    }

    async fn run_session(
        &mut self,
        id: Uuid,
        link: &mut dyn LinkChannel,
        operator: &mut OperatorInbox,
    ) -> SessionReport {
        let started = Instant::now();
        let mut report = SessionReport {
            id,
            started_at: Utc::now(),
            outcome: SessionOutcome::Aborted,
            frames: 0,
            approved_at_frame: None,
            elapsed: Duration::ZERO,
        };

        self.state.phase = Phase::Armed;
        info!("[ACTION] Trigger received, turning on the camera");

        if let Err(e) = self.camera.open(&self.camera_config) {
            error!("{}", e);
            link.send(Outbound::Denied);
            self.state.clear();
            report.outcome = SessionOutcome::DeviceUnavailable;
            report.elapsed = started.elapsed();
            return report;
        }

        let mut camera = OpenCamera {
            source: self.camera.as_mut(),
        };
        self.state.begin(Instant::now());

        let outcome = decide(
            &mut camera,
            self.classifier.as_mut(),
            &mut self.state,
            &self.presence,
            &self.policy,
            link,
            operator,
            &mut report,
        )
        .await;
        drop(camera);

        report.elapsed = started.elapsed();
        self.state.phase = outcome.terminal_phase();

        if outcome.requires_cooldown() {
            self.cool_down(link, operator).await;
        }

        self.state.clear();
        report.outcome = outcome;
        info!(
            "Session ended: {:?} after {} frames in {:?}",
            report.outcome, report.frames, report.elapsed
        );
        report
    }

    /// Quiet period: anything the device sends meanwhile is discarded
    async fn cool_down(&mut self, link: &mut dyn LinkChannel, operator: &mut OperatorInbox) {
        self.state.phase = Phase::Cooldown;
        let cooldown = self.policy.cooldown();
        info!("Cooling down for {:?}", cooldown);

        let deadline = Instant::now() + cooldown;
        loop {
            discard_inbound(link);

            if let Some(command) = operator.try_next() {
                debug!("Operator {:?} during cooldown", command);
            }
            if operator.shutdown_requested() {
                info!("Cooldown cut short by shutdown");
                return;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep((deadline - now).min(self.policy.idle_poll())).await;
        }

        discard_inbound(link);
        info!("[STATE] Cooling complete, waiting for the next trigger");
    }

    /// Release the camera if anything left it open
    pub fn release(&mut self) {
        if self.camera.is_open() {
            self.camera.close();
        }
        self.state.clear();
    }
}

fn discard_inbound(link: &mut dyn LinkChannel) {
    while let Some(line) = link.try_receive() {
        debug!("Ignoring {:?} during cooldown", line);
    }
}

/// Per-frame decision loop; returns the single terminal outcome
#[allow(clippy::too_many_arguments)]
async fn decide(
    camera: &mut OpenCamera<'_>,
    classifier: &mut dyn Classifier,
    state: &mut SessionState,
    presence: &PresenceConfig,
    policy: &SessionConfig,
    link: &mut dyn LinkChannel,
    operator: &mut OperatorInbox,
    report: &mut SessionReport,
) -> SessionOutcome {
    loop {
        if let Some(command) = operator.try_next() {
            info!("[QUIT] Operator {:?}, releasing the camera", command);
            return SessionOutcome::Aborted;
        }

        let frame = match guarded(|| camera.source.read_frame()) {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                error!("{}", e);
                return SessionOutcome::Faulted {
                    reason: e.to_string(),
                    unexpected: false,
                };
            }
            Err(message) => {
                error!("Camera panicked: {}", message);
                return SessionOutcome::Faulted {
                    reason: message,
                    unexpected: true,
                };
            }
        };
        report.frames += 1;

        let detections = match guarded(|| {
            classifier.detect(&frame, presence.confidence_threshold)
        }) {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => {
                error!("{}", e);
                return SessionOutcome::Faulted {
                    reason: e.to_string(),
                    unexpected: false,
                };
            }
            Err(message) => {
                error!("Classifier panicked: {}", message);
                return SessionOutcome::Faulted {
                    reason: message,
                    unexpected: true,
                };
            }
        };

        let signal = presence_signal(&detections, presence);
        if state.observe(signal) {
            info!("[RESULT] Human confirmed, sending APPROVED");
            link.send(Outbound::Approved);
            report.approved_at_frame = Some(report.frames - 1);
        }
        debug!(
            "Frame {}: human={} hits={}",
            frame.sequence,
            signal,
            state.consecutive_hits()
        );

        // Read every buffered line before looking at the clock, so an unlock
        // that already arrived wins over a timeout expiring this iteration.
        while let Some(line) = link.try_receive() {
            match line.parse::<Inbound>() {
                Ok(Inbound::Unlocked) => {
                    info!("[INFO] Device verification complete, turning off the camera");
                    return SessionOutcome::Unlocked;
                }
                Ok(Inbound::Trigger) => debug!("Trigger ignored, session already running"),
                Err(e) => warn!("{}", e),
            }
        }

        if state.is_expired(Instant::now(), policy.auth_timeout()) {
            if !state.confirmed() {
                warn!("[TIMEOUT] No human detected, sending DENIED");
                link.send(Outbound::Denied);
                return SessionOutcome::TimedOut;
            }
            if policy.deny_after_approval {
                warn!("[TIMEOUT] Approved but device never unlocked, sending DENIED");
                link.send(Outbound::Denied);
                return SessionOutcome::TimedOut;
            }
            warn!("[TIMEOUT] Approved but device never unlocked");
            return SessionOutcome::ApprovalExpired;
        }

        let interval = policy.frame_interval();
        if interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(interval).await;
        }
    }
}

/// Run a collaborator call, turning a panic into an error message
fn guarded<T>(call: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}
