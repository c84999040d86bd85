//! Host audio backend seam
//!
//! The OS audio stack is reached through [`AudioBackend`]. Change
//! notifications are registered per object and arrive on arbitrary native
//! threads; they are forwarded into a [`NotificationSink`] and processed on
//! the mirror's own task. Every registration returns a [`NativeHandle`]
//! which the mirror wraps in a [`Watch`] so it is released exactly once.

use maxmix_core::Flow;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::model::{DeviceDescriptor, SessionDescriptor};

/// A change reported by the audio backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    DeviceAdded { device_id: String },
    DeviceRemoved { device_id: String },
    DeviceStateChanged { device_id: String, active: bool },
    DefaultDeviceChanged { flow: Flow, device_id: Option<String> },
    EndpointVolume { device_id: String, volume: u8, muted: bool },
    SessionCreated { session: SessionDescriptor },
    SessionVolume { session_id: String, volume: u8, muted: bool },
    SessionEnded { session_id: String },
}

/// Thread-safe entry point for backend callbacks
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    /// Forward a notification. Returns false once the mirror is gone.
    pub fn notify(&self, notification: Notification) -> bool {
        self.tx.send(notification).is_ok()
    }
}

/// A registered native callback or COM-style object reference
pub trait NativeHandle: Send {
    /// Unregister / dispose. Called at most once.
    fn release(&mut self) -> Result<()>;
}

/// Owns a [`NativeHandle`] and releases it on drop.
///
/// Release failures are expected when the underlying object was already
/// invalidated by the OS; they are logged and swallowed.
pub struct Watch {
    label: String,
    handle: Option<Box<dyn NativeHandle>>,
}

impl Watch {
    pub fn new(label: impl Into<String>, handle: Box<dyn NativeHandle>) -> Self {
        Self {
            label: label.into(),
            handle: Some(handle),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.release() {
                debug!("Ignoring release failure for {}: {}", self.label, e);
            }
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("label", &self.label)
            .field("live", &self.handle.is_some())
            .finish()
    }
}

/// Host audio subsystem
pub trait AudioBackend: Send + Sync {
    /// Active endpoints of one direction
    fn devices(&self, flow: Flow) -> Result<Vec<DeviceDescriptor>>;

    /// A single endpoint, `None` if it is gone or inactive
    fn device(&self, device_id: &str) -> Result<Option<DeviceDescriptor>>;

    /// Identifier of the default endpoint of one direction
    fn default_device(&self, flow: Flow) -> Result<Option<String>>;

    /// Active sessions playing on an endpoint
    fn sessions(&self, device_id: &str) -> Result<Vec<SessionDescriptor>>;

    fn set_endpoint_volume(&self, device_id: &str, volume: u8, muted: bool) -> Result<()>;

    fn set_session_volume(&self, session_id: &str, volume: u8, muted: bool) -> Result<()>;

    fn set_default_endpoint(&self, device_id: &str) -> Result<()>;

    /// Device arrival, removal, state and default changes
    fn watch_topology(&self, sink: NotificationSink) -> Result<Box<dyn NativeHandle>>;

    /// Volume and mute of one endpoint
    fn watch_endpoint(&self, device_id: &str, sink: NotificationSink)
        -> Result<Box<dyn NativeHandle>>;

    /// New sessions on one endpoint
    fn watch_sessions(&self, device_id: &str, sink: NotificationSink)
        -> Result<Box<dyn NativeHandle>>;

    /// Volume, mute and end of one session
    fn watch_session(&self, session_id: &str, sink: NotificationSink)
        -> Result<Box<dyn NativeHandle>>;
}
