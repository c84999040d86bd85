//! Tag table and packet layer
//!
//! Packet layout before stuffing:
//! ```text
//! ┌──────────┬─────┬────────────┬────────┐
//! │ revision │ tag │ body (N)   │ length │
//! └──────────┴─────┴────────────┴────────┘
//! ```
//! `length` counts every byte of the packet including itself.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use crate::message::{Message, MessageKind};
use crate::{cobs, Error, Result, MAX_PACKET_LENGTH};

/// Revision, tag and length byte
const PACKET_OVERHEAD: usize = 3;

/// Bidirectional tag <-> message kind mapping
#[derive(Debug, Clone, Default)]
pub struct Registry {
    by_tag: HashMap<u8, MessageKind>,
    by_kind: HashMap<MessageKind, u8>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard device tag table, tags starting at 1
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (tag, kind) in (1u8..).zip(MessageKind::ALL) {
            registry.register(tag, kind);
        }
        registry
    }

    /// Bind `tag` to `kind`.
    ///
    /// Any previous binding of either side is dropped so the mapping stays
    /// one-to-one. Returns the kind the tag was bound to before, if any.
    pub fn register(&mut self, tag: u8, kind: MessageKind) -> Option<MessageKind> {
        if let Some(old_tag) = self.by_kind.insert(kind, tag) {
            if old_tag != tag {
                self.by_tag.remove(&old_tag);
            }
        }

        let previous = self.by_tag.insert(tag, kind);
        if let Some(old_kind) = previous {
            if old_kind != kind {
                self.by_kind.remove(&old_kind);
            }
        }
        previous
    }

    pub fn tag_of(&self, kind: MessageKind) -> Option<u8> {
        self.by_kind.get(&kind).copied()
    }

    pub fn kind_of(&self, tag: u8) -> Option<MessageKind> {
        self.by_tag.get(&tag).copied()
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Build the unstuffed packet for a message
    pub fn encode_packet(&self, message: &Message, revision: u8) -> Result<Vec<u8>> {
        let kind = message.kind();
        let tag = self.tag_of(kind).ok_or(Error::UnregisteredKind(kind))?;

        let mut buf = BytesMut::with_capacity(MAX_PACKET_LENGTH);
        buf.put_u8(revision);
        buf.put_u8(tag);
        message.encode_body(&mut buf);

        let length = buf.len() + 1;
        if length > MAX_PACKET_LENGTH {
            return Err(Error::PacketTooLong(length));
        }
        buf.put_u8(length as u8);

        Ok(buf.to_vec())
    }

    /// Parse an unstuffed packet into its message and revision
    pub fn decode_packet(&self, packet: &[u8]) -> Result<(Message, u8)> {
        if packet.len() < PACKET_OVERHEAD {
            return Err(Error::PacketTooShort(packet.len()));
        }

        let expected = packet[packet.len() - 1] as usize;
        if expected != packet.len() {
            return Err(Error::LengthMismatch {
                expected,
                actual: packet.len(),
            });
        }

        let revision = packet[0];
        let tag = packet[1];
        let kind = self.kind_of(tag).ok_or(Error::UnknownTag(tag))?;
        let message = Message::decode_body(kind, &packet[2..packet.len() - 1])?;

        Ok((message, revision))
    }

    /// Serialize a message into a complete, delimiter-terminated frame
    pub fn serialize(&self, message: &Message, revision: u8) -> Result<Vec<u8>> {
        let packet = self.encode_packet(message, revision)?;
        cobs::encode(&packet)
    }

    /// Deserialize a frame, with or without its trailing delimiter
    pub fn deserialize(&self, frame: &[u8]) -> Result<(Message, u8)> {
        let packet = cobs::decode(frame)?;
        self.decode_packet(&packet)
    }
}
