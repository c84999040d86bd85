//! The running MaxMix service
//!
//! ```text
//! MirrorEvent ──┐                        ┌──► CommandQueue ──► Connection ──► device
//!               ├──► sync task ──────────┤
//! ConnectionEvent┘        │              └──► ServiceEvent (consumer)
//!                         └──► Mixer::set_volume / set_default_endpoint
//! ```

use bytes::Bytes;
use maxmix_audio::{MirrorEvent, Mixer};
use maxmix_core::message::MAX_BODY_LEN;
use maxmix_core::{CommandQueue, DisplayData, Message, Registry, Settings};
use maxmix_transport::{
    Connection, ConnectionEvent, ConnectionState, LinkStatsSnapshot, PortProvider,
    TransportConfig,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::MaxMixBuilder;
use crate::commands;
use crate::error::{ClientError, Result};

/// Link-level notifications for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// A device answered the handshake on this port
    Discovered { port: String },
    /// The device is synchronized and accepting commands
    Connected { port: String },
    Disconnected { port: String },
    /// A device answered with a firmware revision this host does not speak
    FirmwareIncompatible { port: String, revision: u8 },
}

/// Keeps one MaxMix device in sync with a [`Mixer`]
pub struct MaxMix {
    connection: Connection,
    queue: Arc<CommandQueue>,
    settings: Arc<RwLock<Settings>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MaxMix {
    pub fn builder() -> MaxMixBuilder {
        MaxMixBuilder::new()
    }

    pub(crate) fn spawn(
        provider: Arc<dyn PortProvider>,
        mixer: Arc<dyn Mixer>,
        mirror_events: mpsc::UnboundedReceiver<MirrorEvent>,
        transport: TransportConfig,
        settings: Settings,
        queue_capacity: usize,
        registry: Registry,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let queue = Arc::new(CommandQueue::new(queue_capacity));
        let settings = Arc::new(RwLock::new(settings));
        let (connection, connection_events) =
            Connection::start(provider, queue.clone(), Arc::new(registry), transport);
        let (tx, rx) = mpsc::unbounded_channel();

        let sync = SyncTask {
            mixer,
            queue: queue.clone(),
            settings: settings.clone(),
            events: tx,
            connected: false,
        };
        let task = tokio::spawn(sync.run(connection_events, mirror_events));

        let service = Self {
            connection,
            queue,
            settings,
            task: Mutex::new(Some(task)),
        };
        (service, rx)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn port_name(&self) -> Option<String> {
        self.connection.port_name()
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.connection.stats()
    }

    /// Commands waiting to be written
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Current device settings snapshot
    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Replace the device settings. Sent right away when connected and on
    /// every later connect.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write() = settings.clone();
        if self.is_connected() {
            commands::enqueue(&self.queue, Message::Settings(settings));
        }
    }

    /// Forward a pixel blob to the device screen
    pub fn send_display(&self, pixels: impl Into<Bytes>) -> Result<()> {
        let pixels = pixels.into();
        if pixels.len() > MAX_BODY_LEN {
            return Err(ClientError::DisplayTooLarge(pixels.len()));
        }
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        commands::enqueue(&self.queue, Message::DisplayData(DisplayData { pixels }));
        Ok(())
    }

    /// Stop the connection and the sync task
    pub async fn shutdown(&self) {
        self.connection.stop().await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Sync task ended abnormally: {}", e);
            }
        }
        info!("MaxMix service stopped");
    }
}

impl Drop for MaxMix {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for MaxMix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxMix")
            .field("state", &self.connection.state())
            .field("port", &self.connection.port_name())
            .field("pending", &self.queue.len())
            .finish()
    }
}

struct SyncTask {
    mixer: Arc<dyn Mixer>,
    queue: Arc<CommandQueue>,
    settings: Arc<RwLock<Settings>>,
    events: mpsc::UnboundedSender<ServiceEvent>,
    connected: bool,
}

impl SyncTask {
    async fn run(
        mut self,
        mut connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut mirror_events: mpsc::UnboundedReceiver<MirrorEvent>,
    ) {
        let mut mirror_open = true;
        loop {
            tokio::select! {
                event = connection_events.recv() => match event {
                    Some(event) => self.on_connection_event(event),
                    None => break,
                },
                event = mirror_events.recv(), if mirror_open => match event {
                    Some(event) => self.on_mirror_event(event),
                    None => {
                        debug!("Mirror event stream closed");
                        mirror_open = false;
                    }
                },
            }
        }
        debug!("Sync task stopped");
    }

    fn emit(&self, event: ServiceEvent) {
        let _ = self.events.send(event);
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::DeviceDiscovered { port } => {
                self.emit(ServiceEvent::Discovered { port });
            }
            ConnectionEvent::DeviceConnected { port } => {
                self.connected = true;
                self.resync();
                self.emit(ServiceEvent::Connected { port });
            }
            ConnectionEvent::DeviceDisconnected { port } => {
                self.connected = false;
                self.queue.clear();
                self.emit(ServiceEvent::Disconnected { port });
            }
            ConnectionEvent::FirmwareIncompatible { port, revision } => {
                self.emit(ServiceEvent::FirmwareIncompatible { port, revision });
            }
            ConnectionEvent::MessageReceived { tag, message } => {
                self.on_device_message(tag, message);
            }
        }
    }

    fn resync(&self) {
        let items = self.mixer.items();
        let settings = self.settings.read().clone();
        let messages = commands::resync(&settings, &items);
        info!("Resyncing device with {} items", items.len());
        for message in messages {
            commands::enqueue(&self.queue, message);
        }
    }

    fn on_mirror_event(&self, event: MirrorEvent) {
        if !self.connected {
            debug!("Not connected, dropping {:?}", event);
            return;
        }
        let mixer = &self.mixer;
        for message in commands::for_event(&event, || mixer.items()) {
            commands::enqueue(&self.queue, message);
        }
    }

    fn on_device_message(&self, tag: u8, message: Message) {
        let result = match &message {
            Message::UpdateVolume(update) => {
                debug!(
                    "Device set item {} to {} (muted: {})",
                    update.id, update.volume, update.muted
                );
                self.mixer
                    .set_volume(update.id, update.volume, update.muted)
            }
            Message::SetDefaultEndpoint(default) => {
                debug!("Device set default endpoint {}", default.id);
                self.mixer.set_default_endpoint(default.id)
            }
            other => {
                debug!("Ignoring device message with tag {}: {:?}", tag, other);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Failed to apply device change: {}", e);
        }
    }
}
