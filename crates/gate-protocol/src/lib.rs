//! Gate Link Protocol
//!
//! This crate provides the line-oriented link between the gate controller and
//! the door microcontroller. The microcontroller reports motion and unlock
//! completion, the controller answers with an authorization verdict:
//!
//! | Direction | Token      |
//! |-----------|------------|
//! | in        | `TRIGGER`  |
//! | in        | `UNLOCKED` |
//! | out       | `APPROVED` |
//! | out       | `DENIED`   |
//!
//! The link never blocks its caller and degrades to a detached mode when the
//! serial port is missing, so the rest of the system keeps working without
//! hardware.

mod command;
mod error;
mod link;
mod memory;

pub use command::{Inbound, Outbound};
pub use error::LinkError;
pub use link::{connect_or_detach, DetachedLink, LinkChannel, SerialLink};
pub use memory::MemoryLink;

/// Serial defaults matching the door firmware's `Serial.begin()`
pub mod defaults {
    /// Baud rate
    pub const BAUD_RATE: u32 = 9600;
    /// Time the microcontroller needs to reboot after the port is opened (ms)
    pub const SETTLE_MS: u64 = 2000;
    /// Capacity of the inbound and outbound line queues
    pub const QUEUE_DEPTH: usize = 32;
}
