//! Live mirror of the host audio topology
//!
//! ```text
//! ┌─────────────┐  Notification   ┌──────────────┐  MirrorEvent
//! │ AudioBackend│────────────────►│ pump task    │─────────────►  consumer
//! │ (native cb) │  (any thread)   │ AudioMirror  │
//! └──────▲──────┘                 └──────┬───────┘
//!        │          set_volume /         │
//!        └──────── set_default ◄─────────┘
//! ```
//!
//! Sessions sharing a process are collapsed into one session group. A
//! change requested through the mirror arms a one-shot suppression on the
//! touched entry so the backend's echo of that change is absorbed instead
//! of being reported back.

use maxmix_core::{Flow, ItemId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AudioBackend, Notification, NotificationSink, Watch};
use crate::error::{AudioError, Result};
use crate::mixer::Mixer;
use crate::model::{
    device_display_name, device_item_id, group_item_id, session_display_name, DeviceDescriptor,
    ItemKind, MixItem, SessionDescriptor,
};

/// Topology or volume change observed by the mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    DeviceCreated(MixItem),
    DeviceRemoved { id: ItemId, flow: Flow },
    DeviceVolumeChanged(MixItem),
    DefaultChanged(MixItem),
    SessionGroupCreated(MixItem),
    SessionGroupRemoved { id: ItemId },
    SessionGroupVolumeChanged(MixItem),
}

impl MirrorEvent {
    /// Id of the item the event concerns
    pub fn item_id(&self) -> ItemId {
        match self {
            MirrorEvent::DeviceCreated(item)
            | MirrorEvent::DeviceVolumeChanged(item)
            | MirrorEvent::DefaultChanged(item)
            | MirrorEvent::SessionGroupCreated(item)
            | MirrorEvent::SessionGroupVolumeChanged(item) => item.id,
            MirrorEvent::DeviceRemoved { id, .. } | MirrorEvent::SessionGroupRemoved { id } => *id,
        }
    }
}

struct DeviceEntry {
    id: ItemId,
    device_id: String,
    name: String,
    flow: Flow,
    volume: u8,
    muted: bool,
    is_default: bool,
    suppress_notify: bool,
    order: u64,
    _watches: Vec<Watch>,
}

impl DeviceEntry {
    fn snapshot(&self) -> MixItem {
        MixItem {
            id: self.id,
            name: self.name.clone(),
            volume: self.volume,
            muted: self.muted,
            kind: ItemKind::Device {
                flow: self.flow,
                is_default: self.is_default,
            },
        }
    }
}

struct SessionEntry {
    session_id: String,
    device_id: String,
    volume: u8,
    muted: bool,
    suppress_notify: bool,
    _watch: Option<Watch>,
}

struct GroupEntry {
    id: ItemId,
    name: String,
    volume: u8,
    muted: bool,
    order: u64,
    sessions: Vec<SessionEntry>,
}

impl GroupEntry {
    fn snapshot(&self) -> MixItem {
        MixItem {
            id: self.id,
            name: self.name.clone(),
            volume: self.volume,
            muted: self.muted,
            kind: ItemKind::SessionGroup,
        }
    }
}

#[derive(Default)]
struct State {
    devices: HashMap<ItemId, DeviceEntry>,
    device_index: HashMap<String, ItemId>,
    groups: HashMap<ItemId, GroupEntry>,
    session_index: HashMap<String, ItemId>,
    defaults: HashMap<Flow, String>,
    next_order: u64,
    closed: bool,
}

impl State {
    fn next_order(&mut self) -> u64 {
        self.next_order += 1;
        self.next_order
    }
}

enum VolumeTarget {
    Device(String),
    Sessions(Vec<String>),
}

/// Mirror of the host's devices and session groups
pub struct AudioMirror {
    backend: Arc<dyn AudioBackend>,
    state: Mutex<State>,
    sink: NotificationSink,
    events: mpsc::UnboundedSender<MirrorEvent>,
    topology: Mutex<Option<Watch>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl AudioMirror {
    /// Enumerate the backend, register every watch and start processing
    /// notifications. Initial items are reported as created events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        backend: Arc<dyn AudioBackend>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<MirrorEvent>)> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mirror = Arc::new(Self {
            backend,
            state: Mutex::new(State::default()),
            sink: NotificationSink::new(notify_tx),
            events: event_tx,
            topology: Mutex::new(None),
            pump: Mutex::new(None),
        });

        // Topology first so no device arrival slips between enumeration and watch
        let handle = mirror.backend.watch_topology(mirror.sink.clone())?;
        *mirror.topology.lock() = Some(Watch::new("topology", handle));

        mirror.enumerate()?;

        let pump = tokio::spawn(pump(Arc::downgrade(&mirror), notify_rx));
        *mirror.pump.lock() = Some(pump);

        let (devices, groups) = {
            let state = mirror.state.lock();
            (state.devices.len(), state.groups.len())
        };
        info!(
            "Audio mirror started with {} devices and {} session groups",
            devices, groups
        );
        Ok((mirror, event_rx))
    }

    fn enumerate(&self) -> Result<()> {
        for flow in Flow::both() {
            if let Some(default) = self.backend.default_device(flow)? {
                self.state.lock().defaults.insert(flow, default);
            }
            for device in self.backend.devices(flow)? {
                self.add_device(device);
            }
        }
        Ok(())
    }

    /// Apply one backend notification
    pub fn apply(&self, notification: Notification) {
        debug!("Audio notification: {:?}", notification);
        match notification {
            Notification::DeviceAdded { device_id } => self.refresh_device(&device_id),
            Notification::DeviceRemoved { device_id } => self.remove_device(&device_id),
            Notification::DeviceStateChanged { device_id, active } => {
                if active {
                    self.refresh_device(&device_id);
                } else {
                    self.remove_device(&device_id);
                }
            }
            Notification::DefaultDeviceChanged { flow, device_id } => {
                self.default_changed(flow, device_id)
            }
            Notification::EndpointVolume {
                device_id,
                volume,
                muted,
            } => self.endpoint_volume(&device_id, volume, muted),
            Notification::SessionCreated { session } => self.add_session(session),
            Notification::SessionVolume {
                session_id,
                volume,
                muted,
            } => self.session_volume(&session_id, volume, muted),
            Notification::SessionEnded { session_id } => self.remove_session(&session_id),
        }
    }

    fn emit(&self, event: MirrorEvent) {
        let _ = self.events.send(event);
    }

    fn refresh_device(&self, device_id: &str) {
        if self.state.lock().device_index.contains_key(device_id) {
            return;
        }
        match self.backend.device(device_id) {
            Ok(Some(device)) => self.add_device(device),
            Ok(None) => debug!("Device {} is not active, ignoring", device_id),
            Err(e) => warn!("Failed to query device {}: {}", device_id, e),
        }
    }

    fn add_device(&self, device: DeviceDescriptor) {
        if self.state.lock().device_index.contains_key(&device.id) {
            return;
        }

        let mut watches = Vec::new();
        match self.backend.watch_endpoint(&device.id, self.sink.clone()) {
            Ok(handle) => watches.push(Watch::new(format!("endpoint {}", device.id), handle)),
            Err(e) => warn!("Failed to watch endpoint {}: {}", device.id, e),
        }
        if device.flow == Flow::Output {
            match self.backend.watch_sessions(&device.id, self.sink.clone()) {
                Ok(handle) => watches.push(Watch::new(format!("sessions {}", device.id), handle)),
                Err(e) => warn!("Failed to watch sessions of {}: {}", device.id, e),
            }
        }

        let item = {
            let mut state = self.state.lock();
            if state.closed || state.device_index.contains_key(&device.id) {
                return;
            }
            let id = device_item_id(&device.id);
            let order = state.next_order();
            let entry = DeviceEntry {
                id,
                device_id: device.id.clone(),
                name: device_display_name(&device.friendly_name),
                flow: device.flow,
                volume: device.volume.min(100),
                muted: device.muted,
                is_default: state.defaults.get(&device.flow) == Some(&device.id),
                suppress_notify: false,
                order,
                _watches: watches,
            };
            let item = entry.snapshot();
            state.device_index.insert(device.id.clone(), id);
            state.devices.insert(id, entry);
            item
        };

        debug!("Device created: {} ({})", item.name, item.id);
        self.emit(MirrorEvent::DeviceCreated(item));

        if device.flow == Flow::Output {
            match self.backend.sessions(&device.id) {
                Ok(sessions) => {
                    for session in sessions {
                        self.add_session(session);
                    }
                }
                Err(e) => warn!("Failed to enumerate sessions of {}: {}", device.id, e),
            }
        }
    }

    fn remove_device(&self, device_id: &str) {
        let (entry, orphans) = {
            let mut state = self.state.lock();
            let Some(id) = state.device_index.remove(device_id) else {
                return;
            };
            let entry = state.devices.remove(&id);
            let orphans: Vec<String> = state
                .groups
                .values()
                .flat_map(|g| g.sessions.iter())
                .filter(|s| s.device_id == device_id)
                .map(|s| s.session_id.clone())
                .collect();
            (entry, orphans)
        };

        if let Some(entry) = entry {
            debug!("Device removed: {} ({})", entry.name, entry.id);
            let (id, flow) = (entry.id, entry.flow);
            drop(entry);
            self.emit(MirrorEvent::DeviceRemoved { id, flow });
        }

        for session_id in orphans {
            self.remove_session(&session_id);
        }
    }

    fn default_changed(&self, flow: Flow, device_id: Option<String>) {
        let item = {
            let mut state = self.state.lock();
            match &device_id {
                Some(id) => {
                    state.defaults.insert(flow, id.clone());
                }
                None => {
                    state.defaults.remove(&flow);
                }
            }
            let mut item = None;
            for device in state.devices.values_mut().filter(|d| d.flow == flow) {
                device.is_default = device_id.as_deref() == Some(device.device_id.as_str());
                if device.is_default {
                    item = Some(device.snapshot());
                }
            }
            item
        };

        if let Some(item) = item {
            self.emit(MirrorEvent::DefaultChanged(item));
        }
    }

    fn endpoint_volume(&self, device_id: &str, volume: u8, muted: bool) {
        let item = {
            let mut state = self.state.lock();
            let Some(id) = state.device_index.get(device_id).copied() else {
                return;
            };
            let Some(device) = state.devices.get_mut(&id) else {
                return;
            };
            device.volume = volume.min(100);
            device.muted = muted;
            if std::mem::take(&mut device.suppress_notify) {
                None
            } else {
                Some(device.snapshot())
            }
        };

        if let Some(item) = item {
            self.emit(MirrorEvent::DeviceVolumeChanged(item));
        }
    }

    fn add_session(&self, session: SessionDescriptor) {
        if self.state.lock().session_index.contains_key(&session.id) {
            return;
        }

        let watch = match self.backend.watch_session(&session.id, self.sink.clone()) {
            Ok(handle) => Some(Watch::new(format!("session {}", session.id), handle)),
            Err(e) => {
                warn!("Failed to watch session {}: {}", session.id, e);
                None
            }
        };

        let group_id = group_item_id(&session);
        let created = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.closed || state.session_index.contains_key(&session.id) {
                return;
            }
            let entry = SessionEntry {
                session_id: session.id.clone(),
                device_id: session.device_id.clone(),
                volume: session.volume.min(100),
                muted: session.muted,
                suppress_notify: false,
                _watch: watch,
            };
            state.session_index.insert(session.id.clone(), group_id);
            if let Some(group) = state.groups.get_mut(&group_id) {
                group.sessions.push(entry);
                None
            } else {
                let order = state.next_order();
                let group = GroupEntry {
                    id: group_id,
                    name: session_display_name(&session),
                    volume: entry.volume,
                    muted: entry.muted,
                    order,
                    sessions: vec![entry],
                };
                let item = group.snapshot();
                state.groups.insert(group_id, group);
                Some(item)
            }
        };

        if let Some(item) = created {
            debug!("Session group created: {} ({})", item.name, item.id);
            self.emit(MirrorEvent::SessionGroupCreated(item));
        }
    }

    fn session_volume(&self, session_id: &str, volume: u8, muted: bool) {
        let item = {
            let mut state = self.state.lock();
            let Some(group_id) = state.session_index.get(session_id).copied() else {
                return;
            };
            let Some(group) = state.groups.get_mut(&group_id) else {
                return;
            };
            let Some(session) = group
                .sessions
                .iter_mut()
                .find(|s| s.session_id == session_id)
            else {
                return;
            };
            session.volume = volume.min(100);
            session.muted = muted;
            if std::mem::take(&mut session.suppress_notify) {
                None
            } else {
                group.volume = volume.min(100);
                group.muted = muted;
                Some(group.snapshot())
            }
        };

        if let Some(item) = item {
            self.emit(MirrorEvent::SessionGroupVolumeChanged(item));
        }
    }

    fn remove_session(&self, session_id: &str) {
        let (session, emptied) = {
            let mut state = self.state.lock();
            let Some(group_id) = state.session_index.remove(session_id) else {
                return;
            };
            let Some(group) = state.groups.get_mut(&group_id) else {
                return;
            };
            let session = group
                .sessions
                .iter()
                .position(|s| s.session_id == session_id)
                .map(|pos| group.sessions.remove(pos));
            let emptied = if group.sessions.is_empty() {
                state.groups.remove(&group_id)
            } else {
                None
            };
            (session, emptied)
        };

        drop(session);
        if let Some(group) = emptied {
            debug!("Session group removed: {} ({})", group.name, group.id);
            self.emit(MirrorEvent::SessionGroupRemoved { id: group.id });
        }
    }

    /// Devices of one direction, in arrival order
    pub fn devices(&self, flow: Flow) -> Vec<MixItem> {
        let state = self.state.lock();
        let mut devices: Vec<&DeviceEntry> =
            state.devices.values().filter(|d| d.flow == flow).collect();
        devices.sort_by_key(|d| d.order);
        devices.into_iter().map(DeviceEntry::snapshot).collect()
    }

    /// Session groups, in arrival order
    pub fn session_groups(&self) -> Vec<MixItem> {
        let state = self.state.lock();
        let mut groups: Vec<&GroupEntry> = state.groups.values().collect();
        groups.sort_by_key(|g| g.order);
        groups.into_iter().map(GroupEntry::snapshot).collect()
    }

    pub fn default_device(&self, flow: Flow) -> Option<MixItem> {
        let state = self.state.lock();
        let device_id = state.defaults.get(&flow)?;
        let id = state.device_index.get(device_id)?;
        state.devices.get(id).map(DeviceEntry::snapshot)
    }

    pub fn item(&self, id: ItemId) -> Option<MixItem> {
        let state = self.state.lock();
        state
            .devices
            .get(&id)
            .map(DeviceEntry::snapshot)
            .or_else(|| state.groups.get(&id).map(GroupEntry::snapshot))
    }

    /// Set volume and mute of a device or every session of a group.
    ///
    /// Setting the current value is a no-op. The backend's echo of a real
    /// change is not reported as an event.
    pub fn set_volume(&self, id: ItemId, volume: u8, muted: bool) -> Result<()> {
        let volume = volume.min(100);
        let target = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some(device) = state.devices.get_mut(&id) {
                if device.volume == volume && device.muted == muted {
                    return Ok(());
                }
                device.volume = volume;
                device.muted = muted;
                device.suppress_notify = true;
                VolumeTarget::Device(device.device_id.clone())
            } else if let Some(group) = state.groups.get_mut(&id) {
                group.volume = volume;
                group.muted = muted;
                let changed: Vec<String> = group
                    .sessions
                    .iter_mut()
                    .filter(|s| s.volume != volume || s.muted != muted)
                    .map(|s| {
                        s.volume = volume;
                        s.muted = muted;
                        s.suppress_notify = true;
                        s.session_id.clone()
                    })
                    .collect();
                if changed.is_empty() {
                    return Ok(());
                }
                VolumeTarget::Sessions(changed)
            } else {
                return Err(AudioError::UnknownItem(id));
            }
        };

        match target {
            VolumeTarget::Device(device_id) => {
                if let Err(e) = self.backend.set_endpoint_volume(&device_id, volume, muted) {
                    self.disarm_device(id);
                    return Err(e);
                }
            }
            VolumeTarget::Sessions(session_ids) => {
                let mut failure = None;
                for session_id in session_ids {
                    if let Err(e) = self.backend.set_session_volume(&session_id, volume, muted) {
                        self.disarm_session(id, &session_id);
                        failure.get_or_insert(e);
                    }
                }
                if let Some(e) = failure {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Make a device the default endpoint of its direction
    pub fn set_default_endpoint(&self, id: ItemId) -> Result<()> {
        let device_id = {
            let state = self.state.lock();
            match state.devices.get(&id) {
                Some(device) if device.is_default => return Ok(()),
                Some(device) => device.device_id.clone(),
                None if state.groups.contains_key(&id) => {
                    return Err(AudioError::NotADevice(id))
                }
                None => return Err(AudioError::UnknownItem(id)),
            }
        };
        self.backend.set_default_endpoint(&device_id)
    }

    fn disarm_device(&self, id: ItemId) {
        if let Some(device) = self.state.lock().devices.get_mut(&id) {
            device.suppress_notify = false;
        }
    }

    fn disarm_session(&self, group_id: ItemId, session_id: &str) {
        if let Some(group) = self.state.lock().groups.get_mut(&group_id) {
            if let Some(session) = group
                .sessions
                .iter_mut()
                .find(|s| s.session_id == session_id)
            {
                session.suppress_notify = false;
            }
        }
    }

    /// Release every watch and stop processing notifications
    pub fn shutdown(&self) {
        let (devices, groups) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.device_index.clear();
            state.session_index.clear();
            (
                std::mem::take(&mut state.devices),
                std::mem::take(&mut state.groups),
            )
        };
        let topology = self.topology.lock().take();

        drop(topology);
        drop(groups);
        drop(devices);

        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        info!("Audio mirror shut down");
    }
}

impl Drop for AudioMirror {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

impl Mixer for AudioMirror {
    fn items(&self) -> Vec<MixItem> {
        let mut items = self.devices(Flow::Output);
        items.extend(self.devices(Flow::Input));
        items.extend(self.session_groups());
        items
    }

    fn set_volume(&self, id: ItemId, volume: u8, muted: bool) -> Result<()> {
        AudioMirror::set_volume(self, id, volume, muted)
    }

    fn set_default_endpoint(&self, id: ItemId) -> Result<()> {
        AudioMirror::set_default_endpoint(self, id)
    }
}

impl std::fmt::Debug for AudioMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AudioMirror")
            .field("devices", &state.devices.len())
            .field("groups", &state.groups.len())
            .field("closed", &state.closed)
            .finish()
    }
}

async fn pump(mirror: Weak<AudioMirror>, mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        let Some(mirror) = mirror.upgrade() else {
            break;
        };
        if mirror.state.lock().closed {
            break;
        }
        mirror.apply(notification);
    }
    debug!("Audio notification pump stopped");
}
