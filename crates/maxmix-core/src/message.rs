//! Protocol message types
//!
//! Every message body has a fixed byte layout, packed field by field with
//! little-endian integers. The offsets below are part of the wire format
//! shared with the device firmware.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifier of a mixable item, as carried on the wire
pub type ItemId = i32;

/// Length of the fixed name field of [`AddItem`], terminator included
pub const ITEM_NAME_LEN: usize = 24;

/// Maximum body length of any message
pub const MAX_BODY_LEN: usize = crate::MAX_PACKET_LENGTH - 3;

/// Closed set of message variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    HandshakeRequest,
    Acknowledgment,
    Heartbeat,
    Settings,
    SessionInfo,
    AddItem,
    RemoveItem,
    UpdateVolume,
    SetDefaultEndpoint,
    DisplayData,
}

impl MessageKind {
    /// All kinds, in default tag order
    pub const ALL: [MessageKind; 10] = [
        MessageKind::HandshakeRequest,
        MessageKind::Acknowledgment,
        MessageKind::Heartbeat,
        MessageKind::Settings,
        MessageKind::SessionInfo,
        MessageKind::AddItem,
        MessageKind::RemoveItem,
        MessageKind::UpdateVolume,
        MessageKind::SetDefaultEndpoint,
        MessageKind::DisplayData,
    ];

    /// Fixed body length, `None` for variable-length kinds
    pub fn body_len(self) -> Option<usize> {
        match self {
            MessageKind::HandshakeRequest | MessageKind::Heartbeat => Some(0),
            MessageKind::Acknowledgment => Some(1),
            MessageKind::Settings => Some(Settings::LEN),
            MessageKind::SessionInfo => Some(SessionInfo::LEN),
            MessageKind::AddItem => Some(AddItem::LEN),
            MessageKind::RemoveItem => Some(RemoveItem::LEN),
            MessageKind::UpdateVolume => Some(UpdateVolume::LEN),
            MessageKind::SetDefaultEndpoint => Some(SetDefaultEndpoint::LEN),
            MessageKind::DisplayData => None,
        }
    }
}

/// Audio direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Flow {
    #[default]
    Output = 0,
    Input = 1,
}

impl Flow {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Flow::Output),
            1 => Ok(Flow::Input),
            _ => Err(Error::InvalidField {
                field: "flow",
                value,
            }),
        }
    }

    /// Both directions, output first
    pub fn both() -> [Flow; 2] {
        [Flow::Output, Flow::Input]
    }
}

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_slice(&[self.r, self.g, self.b]);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self::new(buf.get_u8(), buf.get_u8(), buf.get_u8())
    }
}

/// Screen the device should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DisplayMode {
    #[default]
    Splash = 0,
    Output = 1,
    Input = 2,
    Application = 3,
    Game = 4,
}

impl DisplayMode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DisplayMode::Splash),
            1 => Ok(DisplayMode::Output),
            2 => Ok(DisplayMode::Input),
            3 => Ok(DisplayMode::Application),
            4 => Ok(DisplayMode::Game),
            _ => Err(Error::InvalidField {
                field: "mode",
                value,
            }),
        }
    }
}

/// Handshake answer and readiness signal from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgment {
    /// Protocol revision spoken by the firmware
    pub revision: u8,
}

/// Device-side preferences, forwarded verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub display_new_session: bool,
    pub sleep_when_inactive: bool,
    pub sleep_after_seconds: u8,
    pub continuous_scroll: bool,
    pub acceleration_percentage: u8,
    pub double_tap_time_ms: u16,
    pub volume_min_color: Rgb,
    pub volume_max_color: Rgb,
    pub mix_channel_a_color: Rgb,
    pub mix_channel_b_color: Rgb,
}

impl Settings {
    pub const LEN: usize = 19;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.display_new_session as u8);
        buf.put_u8(self.sleep_when_inactive as u8);
        buf.put_u8(self.sleep_after_seconds);
        buf.put_u8(self.continuous_scroll as u8);
        buf.put_u8(self.acceleration_percentage);
        buf.put_u16_le(self.double_tap_time_ms);
        self.volume_min_color.put(buf);
        self.volume_max_color.put(buf);
        self.mix_channel_a_color.put(buf);
        self.mix_channel_b_color.put(buf);
    }

    fn decode(mut buf: &[u8]) -> Self {
        Self {
            display_new_session: buf.get_u8() != 0,
            sleep_when_inactive: buf.get_u8() != 0,
            sleep_after_seconds: buf.get_u8(),
            continuous_scroll: buf.get_u8() != 0,
            acceleration_percentage: buf.get_u8(),
            double_tap_time_ms: buf.get_u16_le(),
            volume_min_color: Rgb::get(&mut buf),
            volume_max_color: Rgb::get(&mut buf),
            mix_channel_a_color: Rgb::get(&mut buf),
            mix_channel_b_color: Rgb::get(&mut buf),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_new_session: true,
            sleep_when_inactive: true,
            sleep_after_seconds: 5,
            continuous_scroll: true,
            acceleration_percentage: 60,
            double_tap_time_ms: 500,
            volume_min_color: Rgb::new(0, 0, 255),
            volume_max_color: Rgb::new(255, 0, 0),
            mix_channel_a_color: Rgb::new(0, 0, 255),
            mix_channel_b_color: Rgb::new(255, 0, 255),
        }
    }
}

/// Item counts and the screen to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionInfo {
    pub mode: DisplayMode,
    pub current: u8,
    pub output_count: u8,
    pub input_count: u8,
    pub application_count: u8,
}

impl SessionInfo {
    pub const LEN: usize = 5;
}

/// Announce a device or session group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItem {
    pub id: ItemId,
    pub name: String,
    pub volume: u8,
    pub muted: bool,
    pub is_device: bool,
    pub flow: Flow,
}

impl AddItem {
    pub const LEN: usize = 32;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.id);
        buf.put_slice(&encode_name(&self.name));
        buf.put_u8(self.volume.min(100));
        buf.put_u8(self.muted as u8);
        buf.put_u8(self.is_device as u8);
        buf.put_u8(self.flow as u8);
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        let id = buf.get_i32_le();
        let name = decode_name(&buf[..ITEM_NAME_LEN]);
        buf.advance(ITEM_NAME_LEN);
        Ok(Self {
            id,
            name,
            volume: buf.get_u8(),
            muted: buf.get_u8() != 0,
            is_device: buf.get_u8() != 0,
            flow: Flow::from_u8(buf.get_u8())?,
        })
    }
}

/// Withdraw a device or session group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveItem {
    pub id: ItemId,
    pub is_device: bool,
    pub flow: Flow,
}

impl RemoveItem {
    pub const LEN: usize = 6;
}

/// Volume and mute of one item, in either direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateVolume {
    pub id: ItemId,
    pub volume: u8,
    pub muted: bool,
    pub is_device: bool,
    pub flow: Flow,
}

impl UpdateVolume {
    pub const LEN: usize = 8;
}

/// Default endpoint change, in either direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetDefaultEndpoint {
    pub id: ItemId,
    pub flow: Flow,
}

impl SetDefaultEndpoint {
    pub const LEN: usize = 5;
}

/// Opaque pixel data for the device screen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayData {
    pub pixels: Bytes,
}

/// A protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    HandshakeRequest,
    Acknowledgment(Acknowledgment),
    Heartbeat,
    Settings(Settings),
    SessionInfo(SessionInfo),
    AddItem(AddItem),
    RemoveItem(RemoveItem),
    UpdateVolume(UpdateVolume),
    SetDefaultEndpoint(SetDefaultEndpoint),
    DisplayData(DisplayData),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::HandshakeRequest => MessageKind::HandshakeRequest,
            Message::Acknowledgment(_) => MessageKind::Acknowledgment,
            Message::Heartbeat => MessageKind::Heartbeat,
            Message::Settings(_) => MessageKind::Settings,
            Message::SessionInfo(_) => MessageKind::SessionInfo,
            Message::AddItem(_) => MessageKind::AddItem,
            Message::RemoveItem(_) => MessageKind::RemoveItem,
            Message::UpdateVolume(_) => MessageKind::UpdateVolume,
            Message::SetDefaultEndpoint(_) => MessageKind::SetDefaultEndpoint,
            Message::DisplayData(_) => MessageKind::DisplayData,
        }
    }

    /// The item a per-item message refers to
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Message::AddItem(m) => Some(m.id),
            Message::RemoveItem(m) => Some(m.id),
            Message::UpdateVolume(m) => Some(m.id),
            Message::SetDefaultEndpoint(m) => Some(m.id),
            _ => None,
        }
    }

    /// Append the body bytes of this message
    pub fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            Message::HandshakeRequest | Message::Heartbeat => {}
            Message::Acknowledgment(m) => buf.put_u8(m.revision),
            Message::Settings(m) => m.encode(buf),
            Message::SessionInfo(m) => {
                buf.put_u8(m.mode as u8);
                buf.put_u8(m.current);
                buf.put_u8(m.output_count);
                buf.put_u8(m.input_count);
                buf.put_u8(m.application_count);
            }
            Message::AddItem(m) => m.encode(buf),
            Message::RemoveItem(m) => {
                buf.put_i32_le(m.id);
                buf.put_u8(m.is_device as u8);
                buf.put_u8(m.flow as u8);
            }
            Message::UpdateVolume(m) => {
                buf.put_i32_le(m.id);
                buf.put_u8(m.volume.min(100));
                buf.put_u8(m.muted as u8);
                buf.put_u8(m.is_device as u8);
                buf.put_u8(m.flow as u8);
            }
            Message::SetDefaultEndpoint(m) => {
                buf.put_i32_le(m.id);
                buf.put_u8(m.flow as u8);
            }
            Message::DisplayData(m) => buf.put_slice(&m.pixels),
        }
    }

    /// Parse a body of the given kind
    pub fn decode_body(kind: MessageKind, body: &[u8]) -> Result<Self> {
        match kind.body_len() {
            Some(expected) if expected != body.len() => {
                return Err(Error::InvalidPayload {
                    kind,
                    expected,
                    actual: body.len(),
                });
            }
            None if body.len() > MAX_BODY_LEN => {
                return Err(Error::InvalidPayload {
                    kind,
                    expected: MAX_BODY_LEN,
                    actual: body.len(),
                });
            }
            _ => {}
        }

        let mut buf = body;
        let message = match kind {
            MessageKind::HandshakeRequest => Message::HandshakeRequest,
            MessageKind::Heartbeat => Message::Heartbeat,
            MessageKind::Acknowledgment => Message::Acknowledgment(Acknowledgment {
                revision: buf.get_u8(),
            }),
            MessageKind::Settings => Message::Settings(Settings::decode(buf)),
            MessageKind::SessionInfo => Message::SessionInfo(SessionInfo {
                mode: DisplayMode::from_u8(buf.get_u8())?,
                current: buf.get_u8(),
                output_count: buf.get_u8(),
                input_count: buf.get_u8(),
                application_count: buf.get_u8(),
            }),
            MessageKind::AddItem => Message::AddItem(AddItem::decode(buf)?),
            MessageKind::RemoveItem => Message::RemoveItem(RemoveItem {
                id: buf.get_i32_le(),
                is_device: buf.get_u8() != 0,
                flow: Flow::from_u8(buf.get_u8())?,
            }),
            MessageKind::UpdateVolume => Message::UpdateVolume(UpdateVolume {
                id: buf.get_i32_le(),
                volume: buf.get_u8().min(100),
                muted: buf.get_u8() != 0,
                is_device: buf.get_u8() != 0,
                flow: Flow::from_u8(buf.get_u8())?,
            }),
            MessageKind::SetDefaultEndpoint => Message::SetDefaultEndpoint(SetDefaultEndpoint {
                id: buf.get_i32_le(),
                flow: Flow::from_u8(buf.get_u8())?,
            }),
            MessageKind::DisplayData => Message::DisplayData(DisplayData {
                pixels: Bytes::copy_from_slice(body),
            }),
        };

        Ok(message)
    }
}

/// Upper-cased ASCII, truncated and NUL padded so a terminator always fits
fn encode_name(name: &str) -> [u8; ITEM_NAME_LEN] {
    let mut out = [0u8; ITEM_NAME_LEN];
    let chars = name
        .chars()
        .map(|c| if c.is_ascii() { c.to_ascii_uppercase() as u8 } else { b'?' })
        .filter(|&b| b != 0)
        .take(ITEM_NAME_LEN - 1);
    for (slot, byte) in out.iter_mut().zip(chars) {
        *slot = byte;
    }
    out
}

fn decode_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(message: &Message) -> Vec<u8> {
        let mut buf = BytesMut::new();
        message.encode_body(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_fixed_lengths_match_layouts() {
        let samples = [
            Message::HandshakeRequest,
            Message::Acknowledgment(Acknowledgment { revision: 1 }),
            Message::Heartbeat,
            Message::Settings(Settings::default()),
            Message::SessionInfo(SessionInfo::default()),
            Message::AddItem(AddItem {
                id: 1,
                name: "x".into(),
                volume: 0,
                muted: false,
                is_device: false,
                flow: Flow::Output,
            }),
            Message::RemoveItem(RemoveItem {
                id: 1,
                is_device: true,
                flow: Flow::Input,
            }),
            Message::UpdateVolume(UpdateVolume {
                id: 1,
                volume: 1,
                muted: true,
                is_device: false,
                flow: Flow::Output,
            }),
            Message::SetDefaultEndpoint(SetDefaultEndpoint {
                id: 1,
                flow: Flow::Output,
            }),
        ];

        for message in samples {
            assert_eq!(Some(body(&message).len()), message.kind().body_len());
        }
    }

    #[test]
    fn test_update_volume_layout() {
        let message = Message::UpdateVolume(UpdateVolume {
            id: 3,
            volume: 42,
            muted: false,
            is_device: true,
            flow: Flow::Input,
        });
        assert_eq!(body(&message), vec![3, 0, 0, 0, 42, 0, 1, 1]);
    }

    #[test]
    fn test_negative_id_is_little_endian() {
        let message = Message::SetDefaultEndpoint(SetDefaultEndpoint {
            id: i32::MIN,
            flow: Flow::Output,
        });
        assert_eq!(body(&message), vec![0, 0, 0, 0x80, 0]);
    }

    #[test]
    fn test_settings_layout() {
        let settings = Settings {
            double_tap_time_ms: 0x0102,
            acceleration_percentage: 250,
            ..Settings::default()
        };
        let raw = body(&Message::Settings(settings));
        assert_eq!(&raw[..5], &[1, 1, 5, 1, 250]);
        assert_eq!(&raw[5..7], &[0x02, 0x01]);
        assert_eq!(&raw[7..10], &[0, 0, 255]);
        assert_eq!(&raw[16..19], &[255, 0, 255]);

        match Message::decode_body(MessageKind::Settings, &raw).unwrap() {
            Message::Settings(decoded) => assert_eq!(decoded.acceleration_percentage, 250),
            other => panic!("Expected Settings, got {:?}", other),
        }
    }

    #[test]
    fn test_name_is_uppercased_and_terminated() {
        let raw = encode_name("Spotify Premium Desktop Player");
        assert_eq!(raw[ITEM_NAME_LEN - 1], 0);
        assert_eq!(&raw[..7], b"SPOTIFY");
        assert_eq!(decode_name(&raw), "SPOTIFY PREMIUM DESKTOP");

        let raw = encode_name("Café");
        assert_eq!(decode_name(&raw), "CAF?");
    }

    #[test]
    fn test_add_item_decodes() {
        let original = AddItem {
            id: -77,
            name: "Chrome".into(),
            volume: 80,
            muted: true,
            is_device: false,
            flow: Flow::Output,
        };
        let raw = body(&Message::AddItem(original));
        let decoded = Message::decode_body(MessageKind::AddItem, &raw).unwrap();
        match decoded {
            Message::AddItem(item) => {
                assert_eq!(item.id, -77);
                assert_eq!(item.name, "CHROME");
                assert_eq!(item.volume, 80);
                assert!(item.muted);
            }
            other => panic!("Expected AddItem, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_body_length_rejected() {
        let err = Message::decode_body(MessageKind::UpdateVolume, &[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidPayload {
                kind: MessageKind::UpdateVolume,
                expected: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn test_invalid_flow_rejected() {
        let err = Message::decode_body(MessageKind::SetDefaultEndpoint, &[1, 0, 0, 0, 7])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "flow", value: 7 }));
    }
}
