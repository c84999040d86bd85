//! In-process audio backend
//!
//! Behaves like an OS audio stack: every change, whether requested through
//! [`AudioBackend`] or made host-side, is reported to the registered watches.
//! Used for tests and for running without a native backend.

use maxmix_core::Flow;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::backend::{AudioBackend, NativeHandle, Notification, NotificationSink};
use crate::error::{AudioError, Result};
use crate::model::{DeviceDescriptor, SessionDescriptor};

/// A mutating call received through [`AudioBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    SetEndpointVolume {
        device_id: String,
        volume: u8,
        muted: bool,
    },
    SetSessionVolume {
        session_id: String,
        volume: u8,
        muted: bool,
    },
    SetDefaultEndpoint {
        device_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchTarget {
    Topology,
    Endpoint(String),
    Sessions(String),
    Session(String),
}

struct Watcher {
    target: WatchTarget,
    sink: NotificationSink,
}

#[derive(Default)]
struct HostState {
    devices: Vec<DeviceDescriptor>,
    sessions: Vec<SessionDescriptor>,
    defaults: HashMap<Flow, String>,
    watchers: HashMap<u64, Watcher>,
    next_watch: u64,
    released: u64,
    calls: Vec<HostCall>,
    failing: bool,
}

impl HostState {
    fn sinks(&self, target: &WatchTarget) -> Vec<NotificationSink> {
        self.watchers
            .values()
            .filter(|w| &w.target == target)
            .map(|w| w.sink.clone())
            .collect()
    }
}

/// Simulated host audio subsystem
#[derive(Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, target: WatchTarget, notification: Notification) {
        let sinks = self.state.lock().sinks(&target);
        for sink in sinks {
            sink.notify(notification.clone());
        }
    }

    /// Plug in a device
    pub fn add_device(&self, device: DeviceDescriptor) {
        let device_id = device.id.clone();
        {
            let mut state = self.state.lock();
            state.devices.retain(|d| d.id != device.id);
            state.devices.push(device);
        }
        self.notify(WatchTarget::Topology, Notification::DeviceAdded { device_id });
    }

    /// Unplug a device; its sessions go with it
    pub fn remove_device(&self, device_id: &str) {
        {
            let mut state = self.state.lock();
            state.devices.retain(|d| d.id != device_id);
            state.sessions.retain(|s| s.device_id != device_id);
            state.defaults.retain(|_, d| d != device_id);
        }
        self.notify(
            WatchTarget::Topology,
            Notification::DeviceRemoved {
                device_id: device_id.to_string(),
            },
        );
    }

    /// Change the default endpoint of the device's direction
    pub fn set_default(&self, device_id: &str) -> Result<()> {
        let flow = {
            let mut state = self.state.lock();
            let flow = state
                .devices
                .iter()
                .find(|d| d.id == device_id)
                .map(|d| d.flow)
                .ok_or_else(|| AudioError::UnknownDevice(device_id.to_string()))?;
            state.defaults.insert(flow, device_id.to_string());
            flow
        };
        self.notify(
            WatchTarget::Topology,
            Notification::DefaultDeviceChanged {
                flow,
                device_id: Some(device_id.to_string()),
            },
        );
        Ok(())
    }

    /// Start a session on a device
    pub fn add_session(&self, session: SessionDescriptor) {
        let device_id = session.device_id.clone();
        {
            let mut state = self.state.lock();
            state.sessions.retain(|s| s.id != session.id);
            state.sessions.push(session.clone());
        }
        self.notify(
            WatchTarget::Sessions(device_id),
            Notification::SessionCreated { session },
        );
    }

    pub fn end_session(&self, session_id: &str) {
        self.state.lock().sessions.retain(|s| s.id != session_id);
        self.notify(
            WatchTarget::Session(session_id.to_string()),
            Notification::SessionEnded {
                session_id: session_id.to_string(),
            },
        );
    }

    /// Volume change made by the user on the host
    pub fn change_endpoint_volume(&self, device_id: &str, volume: u8, muted: bool) -> Result<()> {
        let volume = volume.min(100);
        {
            let mut state = self.state.lock();
            let device = state
                .devices
                .iter_mut()
                .find(|d| d.id == device_id)
                .ok_or_else(|| AudioError::UnknownDevice(device_id.to_string()))?;
            device.volume = volume;
            device.muted = muted;
        }
        self.notify(
            WatchTarget::Endpoint(device_id.to_string()),
            Notification::EndpointVolume {
                device_id: device_id.to_string(),
                volume,
                muted,
            },
        );
        Ok(())
    }

    pub fn change_session_volume(&self, session_id: &str, volume: u8, muted: bool) -> Result<()> {
        let volume = volume.min(100);
        {
            let mut state = self.state.lock();
            let session = state
                .sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or_else(|| AudioError::UnknownSession(session_id.to_string()))?;
            session.volume = volume;
            session.muted = muted;
        }
        self.notify(
            WatchTarget::Session(session_id.to_string()),
            Notification::SessionVolume {
                session_id: session_id.to_string(),
                volume,
                muted,
            },
        );
        Ok(())
    }

    /// Make every mutating backend call fail
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Mutating calls received so far
    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn session(&self, session_id: &str) -> Option<SessionDescriptor> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    /// Registered watches not yet released
    pub fn active_watches(&self) -> usize {
        self.state.lock().watchers.len()
    }

    pub fn released_watches(&self) -> u64 {
        self.state.lock().released
    }

    fn record(&self, call: HostCall) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(AudioError::Backend("simulated failure".into()));
        }
        state.calls.push(call);
        Ok(())
    }

    fn register(&self, target: WatchTarget, sink: NotificationSink) -> Box<dyn NativeHandle> {
        let mut state = self.state.lock();
        state.next_watch += 1;
        let id = state.next_watch;
        state.watchers.insert(id, Watcher { target, sink });
        Box::new(SimulatedWatch {
            id,
            host: Arc::downgrade(&self.state),
        })
    }
}

impl std::fmt::Debug for SimulatedHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedHost")
            .field("devices", &state.devices.len())
            .field("sessions", &state.sessions.len())
            .field("watches", &state.watchers.len())
            .finish()
    }
}

struct SimulatedWatch {
    id: u64,
    host: Weak<Mutex<HostState>>,
}

impl NativeHandle for SimulatedWatch {
    fn release(&mut self) -> Result<()> {
        let host = self.host.upgrade().ok_or(AudioError::Released)?;
        let mut state = host.lock();
        state
            .watchers
            .remove(&self.id)
            .ok_or(AudioError::Released)?;
        state.released += 1;
        Ok(())
    }
}

impl AudioBackend for SimulatedHost {
    fn devices(&self, flow: Flow) -> Result<Vec<DeviceDescriptor>> {
        Ok(self
            .state
            .lock()
            .devices
            .iter()
            .filter(|d| d.flow == flow)
            .cloned()
            .collect())
    }

    fn device(&self, device_id: &str) -> Result<Option<DeviceDescriptor>> {
        Ok(self
            .state
            .lock()
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned())
    }

    fn default_device(&self, flow: Flow) -> Result<Option<String>> {
        Ok(self.state.lock().defaults.get(&flow).cloned())
    }

    fn sessions(&self, device_id: &str) -> Result<Vec<SessionDescriptor>> {
        Ok(self
            .state
            .lock()
            .sessions
            .iter()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect())
    }

    fn set_endpoint_volume(&self, device_id: &str, volume: u8, muted: bool) -> Result<()> {
        self.record(HostCall::SetEndpointVolume {
            device_id: device_id.to_string(),
            volume,
            muted,
        })?;
        self.change_endpoint_volume(device_id, volume, muted)
    }

    fn set_session_volume(&self, session_id: &str, volume: u8, muted: bool) -> Result<()> {
        self.record(HostCall::SetSessionVolume {
            session_id: session_id.to_string(),
            volume,
            muted,
        })?;
        self.change_session_volume(session_id, volume, muted)
    }

    fn set_default_endpoint(&self, device_id: &str) -> Result<()> {
        self.record(HostCall::SetDefaultEndpoint {
            device_id: device_id.to_string(),
        })?;
        self.set_default(device_id)
    }

    fn watch_topology(&self, sink: NotificationSink) -> Result<Box<dyn NativeHandle>> {
        Ok(self.register(WatchTarget::Topology, sink))
    }

    fn watch_endpoint(
        &self,
        device_id: &str,
        sink: NotificationSink,
    ) -> Result<Box<dyn NativeHandle>> {
        if self.device(device_id)?.is_none() {
            return Err(AudioError::UnknownDevice(device_id.to_string()));
        }
        Ok(self.register(WatchTarget::Endpoint(device_id.to_string()), sink))
    }

    fn watch_sessions(
        &self,
        device_id: &str,
        sink: NotificationSink,
    ) -> Result<Box<dyn NativeHandle>> {
        if self.device(device_id)?.is_none() {
            return Err(AudioError::UnknownDevice(device_id.to_string()));
        }
        Ok(self.register(WatchTarget::Sessions(device_id.to_string()), sink))
    }

    fn watch_session(
        &self,
        session_id: &str,
        sink: NotificationSink,
    ) -> Result<Box<dyn NativeHandle>> {
        if self.session(session_id).is_none() {
            return Err(AudioError::UnknownSession(session_id.to_string()));
        }
        Ok(self.register(WatchTarget::Session(session_id.to_string()), sink))
    }
}
