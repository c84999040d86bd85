//! # MaxMix Audio
//!
//! Host-side audio model for MaxMix: a live mirror of output and input
//! devices plus per-application session groups, kept in sync with the
//! host audio backend through change notifications.
//!
//! ## Overview
//!
//! ```text
//! AudioBackend ──► AudioMirror ──► MirrorEvent stream
//!                      ▲
//!                      └── Mixer (set_volume / set_default_endpoint)
//! ```
//!
//! The backend is a trait so the mirror runs against the OS stack or
//! against [`SimulatedHost`].

pub mod backend;
pub mod error;
pub mod mirror;
pub mod mixer;
pub mod model;
pub mod simulated;

pub use backend::{AudioBackend, NativeHandle, Notification, NotificationSink, Watch};
pub use error::{AudioError, Result};
pub use maxmix_core::{Flow, ItemId};
pub use mirror::{AudioMirror, MirrorEvent};
pub use mixer::Mixer;
pub use model::{
    device_display_name, device_item_id, group_item_id, session_display_name, DeviceDescriptor,
    ItemKind, MixItem, SessionDescriptor, SYSTEM_SOUNDS_ID, SYSTEM_SOUNDS_NAME,
};
pub use simulated::{HostCall, SimulatedHost};
