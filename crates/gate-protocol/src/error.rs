//! Link Error Types

use thiserror::Error;

/// Errors that can occur on the gate link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Serial port could not be opened or failed mid-run
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Link is absent; sends are dropped and nothing is received
    #[error("Link unavailable: {0}")]
    Unavailable(String),

    /// Inbound line outside the protocol vocabulary
    #[error("Unrecognized line from device: {0:?}")]
    ProtocolNoise(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Serial(err.to_string())
    }
}

impl From<tokio_serial::Error> for LinkError {
    fn from(err: tokio_serial::Error) -> Self {
        LinkError::Serial(err.to_string())
    }
}
