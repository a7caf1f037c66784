//! Gate configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `GATE__SECTION__KEY` environment variables. Everything is read
//! once at startup.

use crate::GateError;
use ::config::{Config, Environment, File};
use camera_capture::CameraConfig;
use gate_protocol::defaults;
use presence::PresenceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Serial link to the door microcontroller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port device path
    pub device: String,
    pub baud_rate: u32,
    /// Delay after opening the port before talking to the device
    pub settle_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyACM0".to_string(),
            baud_rate: defaults::BAUD_RATE,
            settle_ms: defaults::SETTLE_MS,
        }
    }
}

impl LinkConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Session timing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time allowed to confirm a human before denying (seconds)
    pub auth_timeout_secs: u64,

    /// Quiet period after a session ends (seconds)
    pub cooldown_secs: u64,

    /// Pause between frames in a session (milliseconds)
    pub frame_interval_ms: u64,

    /// Link poll period while idle (milliseconds)
    pub idle_poll_ms: u64,

    /// Back-off after an unexpected fault (milliseconds)
    pub error_backoff_ms: u64,

    /// Send `DENIED` at timeout even when `APPROVED` was already sent but the
    /// device never reported `UNLOCKED`
    pub deny_after_approval: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_timeout_secs: 15,
            cooldown_secs: 6,
            frame_interval_ms: 30,
            idle_poll_ms: 50,
            error_backoff_ms: 500,
            deny_after_approval: true,
        }
    }
}

impl SessionConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Complete gate configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub link: LinkConfig,
    pub camera: CameraConfig,
    pub presence: PresenceConfig,
    pub session: SessionConfig,
}

impl GateConfig {
    /// Load defaults, then `path` (if given), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, GateError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("GATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("presence.human_labels")
                    .with_list_parse_key("presence.class_names")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: GateConfig = settings.try_deserialize()?;
        config.presence.normalize_labels();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> Result<(), GateError> {
        let presence = &self.presence;
        if !(0.0..=1.0).contains(&presence.confidence_threshold) {
            return Err(GateError::Config(format!(
                "presence.confidence_threshold must be within [0, 1], got {}",
                presence.confidence_threshold
            )));
        }
        if presence.required_frames == 0 {
            return Err(GateError::Config(
                "presence.required_frames must be at least 1".into(),
            ));
        }
        if presence.human_labels.iter().all(|l| l.trim().is_empty()) {
            return Err(GateError::Config("presence.human_labels is empty".into()));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(GateError::Config(format!(
                "camera dimensions must be non-zero, got {}x{}",
                self.camera.width, self.camera.height
            )));
        }
        if self.session.auth_timeout_secs == 0 {
            return Err(GateError::Config(
                "session.auth_timeout_secs must be non-zero".into(),
            ));
        }
        if self.link.baud_rate == 0 {
            return Err(GateError::Config("link.baud_rate must be non-zero".into()));
        }
        Ok(())
    }
}
