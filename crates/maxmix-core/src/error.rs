//! Error types for the MaxMix wire protocol

use thiserror::Error;

use crate::message::MessageKind;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Payload exceeds what a single frame can carry
    #[error("payload too large: {0} bytes (max 253)")]
    PayloadTooLarge(usize),

    /// Packet length would collide with the length byte limit
    #[error("packet too long: {0} bytes (max 253)")]
    PacketTooLong(usize),

    /// Frame carried no bytes between delimiters
    #[error("empty frame")]
    EmptyFrame,

    /// A length-prefix byte of zero inside a frame
    #[error("zero code byte at offset {offset}")]
    ZeroCode { offset: usize },

    /// A length-prefix byte pointing past the end of the frame
    #[error("code byte 0x{code:02x} at offset {offset} overruns frame of {len} bytes")]
    CodeOverrun { offset: usize, code: u8, len: usize },

    /// A delimiter inside the stuffed data
    #[error("unexpected delimiter at offset {offset}")]
    UnexpectedDelimiter { offset: usize },

    /// Bytes accumulated without a delimiter beyond the frame limit
    #[error("frame overflow: {0} bytes without delimiter")]
    FrameOverflow(usize),

    /// Packet shorter than revision + tag + length
    #[error("packet too short: {0} bytes")]
    PacketTooShort(usize),

    /// Embedded length byte disagrees with the decoded size
    #[error("length mismatch: packet says {expected}, decoded {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// No message kind registered for the tag
    #[error("unknown message tag: {0}")]
    UnknownTag(u8),

    /// Message kind has no tag assigned
    #[error("message kind not registered: {0:?}")]
    UnregisteredKind(MessageKind),

    /// Body does not match the fixed layout of its kind
    #[error("invalid {kind:?} body: expected {expected} bytes, got {actual}")]
    InvalidPayload {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    /// Field value outside its encoding
    #[error("invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: u8 },
}
