//! Mixable items, backend descriptors and stable ids

use maxmix_core::{Flow, ItemId};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;

/// Reserved id of the system sounds session group
pub const SYSTEM_SOUNDS_ID: ItemId = i32::MIN;

/// Name shown for the system sounds session group
pub const SYSTEM_SOUNDS_NAME: &str = "System Sounds";

const UNNAMED: &str = "Unnamed";

/// What kind of thing a [`MixItem`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Device { flow: Flow, is_default: bool },
    SessionGroup,
}

/// Snapshot of a device or session group, the unit the remote controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixItem {
    pub id: ItemId,
    pub name: String,
    pub volume: u8,
    pub muted: bool,
    pub kind: ItemKind,
}

impl MixItem {
    pub fn is_device(&self) -> bool {
        matches!(self.kind, ItemKind::Device { .. })
    }

    /// Direction of the item; session groups always play out
    pub fn flow(&self) -> Flow {
        match self.kind {
            ItemKind::Device { flow, .. } => flow,
            ItemKind::SessionGroup => Flow::Output,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.kind, ItemKind::Device { is_default: true, .. })
    }
}

fn full_volume() -> u8 {
    100
}

/// An endpoint as reported by the audio backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Persistent hardware identifier
    pub id: String,
    pub friendly_name: String,
    #[serde(default)]
    pub flow: Flow,
    #[serde(default = "full_volume")]
    pub volume: u8,
    #[serde(default)]
    pub muted: bool,
}

impl DeviceDescriptor {
    pub fn new(id: &str, friendly_name: &str, flow: Flow) -> Self {
        Self {
            id: id.to_string(),
            friendly_name: friendly_name.to_string(),
            flow,
            volume: 100,
            muted: false,
        }
    }

    pub fn with_volume(mut self, volume: u8, muted: bool) -> Self {
        self.volume = volume.min(100);
        self.muted = muted;
        self
    }
}

/// One audio session as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Unique per session instance
    pub id: String,
    /// Endpoint the session plays on
    pub device_id: String,
    /// Stable identity of the owning process, shared by all its sessions
    pub process_key: String,
    #[serde(default)]
    pub process_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default = "full_volume")]
    pub volume: u8,
    #[serde(default)]
    pub muted: bool,
}

impl SessionDescriptor {
    pub fn new(id: &str, device_id: &str, process_key: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            device_id: device_id.to_string(),
            process_key: process_key.to_string(),
            process_name: String::new(),
            display_name: display_name.to_string(),
            is_system: false,
            volume: 100,
            muted: false,
        }
    }

    /// The system sounds session of a device
    pub fn system(id: &str, device_id: &str) -> Self {
        Self {
            is_system: true,
            ..Self::new(id, device_id, "system", SYSTEM_SOUNDS_NAME)
        }
    }

    pub fn with_process_name(mut self, name: &str) -> Self {
        self.process_name = name.to_string();
        self
    }

    pub fn with_volume(mut self, volume: u8, muted: bool) -> Self {
        self.volume = volume.min(100);
        self.muted = muted;
        self
    }
}

fn stable_hash(key: &str) -> ItemId {
    let mut hasher = FxHasher::default();
    hasher.write(key.as_bytes());
    let id = hasher.finish() as u32 as i32;
    if id == SYSTEM_SOUNDS_ID {
        id.wrapping_add(1)
    } else {
        id
    }
}

/// Id of a device, derived from its persistent identifier
pub fn device_item_id(device_id: &str) -> ItemId {
    stable_hash(device_id)
}

/// Id of the session group a session belongs to
pub fn group_item_id(session: &SessionDescriptor) -> ItemId {
    if session.is_system {
        SYSTEM_SOUNDS_ID
    } else {
        stable_hash(&session.process_key)
    }
}

/// Short device name: `Speakers (Realtek Audio)` becomes `Realtek Audio`
pub fn device_display_name(friendly_name: &str) -> String {
    let trimmed = friendly_name.trim();
    let inner = trimmed
        .rfind('(')
        .and_then(|open| {
            let rest = &trimmed[open + 1..];
            rest.find(')').map(|close| rest[..close].trim())
        })
        .filter(|inner| !inner.is_empty());
    inner.unwrap_or(trimmed).to_string()
}

/// Name of the session group a session belongs to
pub fn session_display_name(session: &SessionDescriptor) -> String {
    if session.is_system {
        return SYSTEM_SOUNDS_NAME.to_string();
    }

    let name = [&session.display_name, &session.process_name]
        .into_iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or(UNNAMED);
    capitalize(name)
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name_uses_parenthesized_part() {
        assert_eq!(device_display_name("Speakers (Realtek Audio)"), "Realtek Audio");
        assert_eq!(device_display_name("Headset (2- USB Audio)"), "2- USB Audio");
        assert_eq!(device_display_name("HDMI Output"), "HDMI Output");
        assert_eq!(device_display_name("Odd ()"), "Odd ()");
    }

    #[test]
    fn test_session_name_fallbacks() {
        let named = SessionDescriptor::new("s1", "d", "p", "discord");
        assert_eq!(session_display_name(&named), "Discord");

        let by_process = SessionDescriptor::new("s2", "d", "p", "").with_process_name("spotify");
        assert_eq!(session_display_name(&by_process), "Spotify");

        let anonymous = SessionDescriptor::new("s3", "d", "p", " ");
        assert_eq!(session_display_name(&anonymous), "Unnamed");

        let system = SessionDescriptor::system("s4", "d");
        assert_eq!(session_display_name(&system), SYSTEM_SOUNDS_NAME);
    }

    #[test]
    fn test_ids_are_stable_and_reserved() {
        assert_eq!(device_item_id("{0.0.0.00000000}.{abc}"), device_item_id("{0.0.0.00000000}.{abc}"));
        assert_ne!(device_item_id("a"), device_item_id("b"));

        let a = SessionDescriptor::new("s1", "d", "chrome.exe", "Chrome");
        let b = SessionDescriptor::new("s2", "d", "chrome.exe", "Chrome");
        assert_eq!(group_item_id(&a), group_item_id(&b));
        assert_eq!(group_item_id(&SessionDescriptor::system("s", "d")), SYSTEM_SOUNDS_ID);
    }
}
