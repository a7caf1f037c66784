//! Presence Gate Controller
//!
//! Bridges a door microcontroller's motion sensor with a camera-based human
//! presence check:
//! 1. The device reports `TRIGGER` when it sees motion.
//! 2. The controller opens the camera and classifies frames until a human is
//!    confirmed over consecutive frames, then sends `APPROVED`.
//! 3. The device finishes its own verification (RFID/PIN) and reports
//!    `UNLOCKED`; the controller releases the camera and cools down.
//! 4. No confirmation within the auth timeout sends `DENIED`.

pub mod config;
pub mod console;
pub mod main_loop;
pub mod operator;
pub mod session;

pub use config::{GateConfig, LinkConfig, SessionConfig};
pub use main_loop::{LoopStep, MainLoop};
pub use operator::{OperatorCommand, OperatorHandle, OperatorInbox};
pub use session::{Phase, SessionController, SessionOutcome, SessionReport, SessionState};

use presence::ClassifierError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Gate controller error types
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<::config::ConfigError> for GateError {
    fn from(err: ::config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Initialize logging
///
/// Honours `RUST_LOG`, defaulting to `info`. Logs go to stderr so stdout
/// stays free for the simulated device link.
pub fn init_logging(json: bool) -> Result<(), GateError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    };

    result.map_err(|e| GateError::Logging(e.to_string()))
}
