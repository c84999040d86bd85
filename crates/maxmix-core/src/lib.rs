//! MaxMix Core
//!
//! Wire-level building blocks for the MaxMix serial link.
//!
//! This crate provides:
//! - Consistent-overhead byte stuffing ([`cobs`])
//! - Delimiter-based stream reassembly ([`FrameAccumulator`])
//! - Fixed-layout protocol messages ([`Message`], [`MessageKind`])
//! - The tag table and packet layer ([`Registry`])
//! - The coalescing outbound queue ([`CommandQueue`])

pub mod cobs;
pub mod error;
pub mod frame;
pub mod message;
pub mod queue;
pub mod registry;

pub use error::{Error, Result};
pub use frame::FrameAccumulator;
pub use message::{
    Acknowledgment, AddItem, DisplayData, DisplayMode, Flow, ItemId, Message, MessageKind,
    RemoveItem, Rgb, SessionInfo, SetDefaultEndpoint, Settings, UpdateVolume,
};
pub use queue::{CommandKey, CommandQueue};
pub use registry::Registry;

/// Protocol revision written into every outgoing packet
pub const PROTOCOL_REVISION: u8 = 1;

/// Frame delimiter
pub const DELIMITER: u8 = 0x00;

/// Maximum encoded frame size, delimiter included
pub const MAX_FRAME_SIZE: usize = 255;

/// Maximum payload accepted by the byte stuffing codec
pub const MAX_PAYLOAD_SIZE: usize = 253;

/// Maximum pre-stuffing packet length (revision + tag + body + length byte)
pub const MAX_PACKET_LENGTH: usize = 253;

/// Default serial baud rate of the device
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default capacity of the outbound command queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
