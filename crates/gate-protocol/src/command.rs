//! Protocol Vocabulary

use crate::error::LinkError;
use std::fmt;
use std::str::FromStr;

/// Lines sent by the door microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Motion sensor fired, start a session
    Trigger,
    /// The door finished its own verification and unlocked
    Unlocked,
}

/// Lines sent to the door microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    /// Human presence confirmed, the door may continue with RFID/PIN
    Approved,
    /// Session failed (timeout or camera unavailable)
    Denied,
}

impl Inbound {
    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Inbound::Trigger => "TRIGGER",
            Inbound::Unlocked => "UNLOCKED",
        }
    }
}

impl Outbound {
    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Outbound::Approved => "APPROVED",
            Outbound::Denied => "DENIED",
        }
    }
}

impl FromStr for Inbound {
    type Err = LinkError;

    /// Exact, case-sensitive match against an already trimmed line
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line {
            "TRIGGER" => Ok(Inbound::Trigger),
            "UNLOCKED" => Ok(Inbound::Unlocked),
            other => Err(LinkError::ProtocolNoise(other.to_string())),
        }
    }
}

impl fmt::Display for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
