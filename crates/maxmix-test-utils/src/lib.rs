//! Common test helpers and utilities for MaxMix tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - In-memory serial ports ([`VirtualPorts`])
//! - A scripted device speaking the wire protocol ([`FakeDevice`])
//! - A mixer that records calls ([`RecordingMixer`])

use async_trait::async_trait;
use maxmix_audio::{AudioError, ItemId, MixItem, Mixer};
use maxmix_core::{Acknowledgment, FrameAccumulator, Message, Registry, PROTOCOL_REVISION};
use maxmix_transport::{BoxedPort, PortProvider, SerialConfig, TransportError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Poll a predicate until it holds or `max_wait` runs out
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        tokio::time::sleep(DEFAULT_CHECK_INTERVAL).await;
    }
    check()
}

/// Receive from a channel until `pred` matches, discarding everything else
pub async fn recv_matching<T, F>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    max_wait: Duration,
    pred: F,
) -> Option<T>
where
    F: Fn(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + max_wait;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(item)) if pred(&item) => return Some(item),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Drain everything currently buffered in a channel
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

// ============================================================================
// Virtual Serial Ports
// ============================================================================

struct PortSlot {
    sessions: mpsc::UnboundedSender<DuplexStream>,
    broken: bool,
    opens: Arc<AtomicU32>,
}

/// In-memory serial ports.
///
/// Every open creates a fresh duplex pipe; the device side is delivered to
/// the [`PortHandle`] returned when the port was attached.
#[derive(Clone, Default)]
pub struct VirtualPorts {
    ports: Arc<Mutex<BTreeMap<String, PortSlot>>>,
}

/// Device side of a virtual port
pub struct PortHandle {
    name: String,
    sessions: mpsc::UnboundedReceiver<DuplexStream>,
    opens: Arc<AtomicU32>,
}

impl PortHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the host to open the port
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.sessions.recv().await
    }

    /// How many times the host opened this port
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl VirtualPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a port, replacing any port with the same name
    pub fn attach(&self, name: &str) -> PortHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let opens = Arc::new(AtomicU32::new(0));
        self.ports.lock().insert(
            name.to_string(),
            PortSlot {
                sessions: tx,
                broken: false,
                opens: opens.clone(),
            },
        );
        PortHandle {
            name: name.to_string(),
            sessions: rx,
            opens,
        }
    }

    /// Plug in a port that is listed but fails to open
    pub fn attach_broken(&self, name: &str) {
        let (tx, _rx) = mpsc::unbounded_channel();
        self.ports.lock().insert(
            name.to_string(),
            PortSlot {
                sessions: tx,
                broken: true,
                opens: Arc::new(AtomicU32::new(0)),
            },
        );
    }

    /// Unplug a port
    pub fn detach(&self, name: &str) {
        self.ports.lock().remove(name);
    }

    /// Plug in a port served by a [`FakeDevice`]
    pub fn attach_device(&self, name: &str, revision: u8) -> FakeDevice {
        FakeDevice::spawn(self.attach(name), revision)
    }
}

#[async_trait]
impl PortProvider for VirtualPorts {
    async fn available_ports(&self) -> maxmix_transport::Result<Vec<String>> {
        Ok(self.ports.lock().keys().cloned().collect())
    }

    async fn open(&self, name: &str, _config: &SerialConfig) -> maxmix_transport::Result<BoxedPort> {
        let ports = self.ports.lock();
        let slot = ports.get(name).ok_or_else(|| TransportError::OpenFailed {
            port: name.to_string(),
            reason: "no such port".into(),
        })?;
        if slot.broken {
            return Err(TransportError::OpenFailed {
                port: name.to_string(),
                reason: "access denied".into(),
            });
        }

        let (host, device) = tokio::io::duplex(1024);
        slot.opens.fetch_add(1, Ordering::SeqCst);
        slot.sessions
            .send(device)
            .map_err(|_| TransportError::OpenFailed {
                port: name.to_string(),
                reason: "device gone".into(),
            })?;
        Ok(Box::new(host))
    }
}

// ============================================================================
// Fake Device - RAII wrapper around a scripted firmware
// ============================================================================

/// A scripted device behind a virtual port.
///
/// It answers handshake requests with an acknowledgment carrying its
/// firmware revision, acknowledges every other command, and records what
/// it received. The task is aborted on drop.
pub struct FakeDevice {
    received: Arc<Mutex<Vec<Message>>>,
    responsive: Arc<AtomicBool>,
    handshakes: Arc<AtomicU32>,
    commands: Arc<AtomicU32>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    opens: Arc<AtomicU32>,
    task: Option<JoinHandle<()>>,
}

struct DeviceState {
    registry: Registry,
    revision: u8,
    received: Arc<Mutex<Vec<Message>>>,
    responsive: Arc<AtomicBool>,
    handshakes: Arc<AtomicU32>,
    commands: Arc<AtomicU32>,
}

impl FakeDevice {
    pub fn spawn(mut handle: PortHandle, revision: u8) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let responsive = Arc::new(AtomicBool::new(true));
        let handshakes = Arc::new(AtomicU32::new(0));
        let commands = Arc::new(AtomicU32::new(0));
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let opens = handle.opens.clone();

        let state = DeviceState {
            registry: Registry::with_defaults(),
            revision,
            received: received.clone(),
            responsive: responsive.clone(),
            handshakes: handshakes.clone(),
            commands: commands.clone(),
        };

        let task = tokio::spawn(async move {
            while let Some(stream) = handle.accept().await {
                debug!("fake device on {}: session opened", handle.name());
                state.serve(stream, &mut outbound_rx).await;
                debug!("fake device on {}: session closed", handle.name());
            }
        });

        Self {
            received,
            responsive,
            handshakes,
            commands,
            outbound,
            opens,
            task: Some(task),
        }
    }

    /// Everything received so far, handshakes and heartbeats included
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// Received messages other than handshake requests and heartbeats
    pub fn commands(&self) -> Vec<Message> {
        self.received
            .lock()
            .iter()
            .filter(|m| !matches!(m, Message::HandshakeRequest | Message::Heartbeat))
            .cloned()
            .collect()
    }

    pub fn command_count(&self) -> u32 {
        self.commands.load(Ordering::SeqCst)
    }

    pub fn handshake_count(&self) -> u32 {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn clear_received(&self) {
        self.received.lock().clear();
    }

    /// Stop answering anything (simulates a hung device)
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }

    /// Send a message to the host at the current protocol revision
    pub fn send(&self, message: &Message) {
        self.send_with_revision(message, PROTOCOL_REVISION);
    }

    pub fn send_with_revision(&self, message: &Message, revision: u8) {
        let frame = Registry::with_defaults()
            .serialize(message, revision)
            .expect("fake device failed to serialize");
        self.send_raw(frame);
    }

    /// Send raw bytes to the host
    pub fn send_raw(&self, bytes: Vec<u8>) {
        let _ = self.outbound.send(bytes);
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl DeviceState {
    async fn serve(&self, stream: DuplexStream, outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>) {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut acc = FrameAccumulator::new();
        let mut buf = [0u8; 256];

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    for frame in acc.push(&buf[..n]) {
                        let Ok(frame) = frame else { continue };
                        let Ok((message, _)) = self.registry.deserialize(&frame) else { continue };
                        if let Some(reply) = self.handle(message) {
                            if writer.write_all(&reply).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Some(bytes) = outbound.recv() => {
                    if writer.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn handle(&self, message: Message) -> Option<Vec<u8>> {
        match message {
            Message::HandshakeRequest => {
                self.handshakes.fetch_add(1, Ordering::SeqCst);
            }
            Message::Heartbeat => {}
            _ => {
                self.commands.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.received.lock().push(message);

        if !self.responsive.load(Ordering::SeqCst) {
            return None;
        }
        let ack = Message::Acknowledgment(Acknowledgment {
            revision: self.revision,
        });
        self.registry.serialize(&ack, PROTOCOL_REVISION).ok()
    }
}

// ============================================================================
// Recording Mixer
// ============================================================================

/// A call made into a [`RecordingMixer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerCall {
    SetVolume { id: ItemId, volume: u8, muted: bool },
    SetDefaultEndpoint { id: ItemId },
}

/// Mixer stand-in that serves a fixed item list and records mutations
#[derive(Default)]
pub struct RecordingMixer {
    items: Mutex<Vec<MixItem>>,
    calls: Mutex<Vec<MixerCall>>,
}

impl RecordingMixer {
    pub fn new(items: Vec<MixItem>) -> Self {
        Self {
            items: Mutex::new(items),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<MixerCall> {
        self.calls.lock().clone()
    }

    pub fn set_items(&self, items: Vec<MixItem>) {
        *self.items.lock() = items;
    }

    /// Wait until at least `count` calls were recorded
    pub async fn wait_for_calls(&self, count: usize, max_wait: Duration) -> bool {
        wait_until(|| self.calls.lock().len() >= count, max_wait).await
    }

    fn record(&self, call: MixerCall) {
        self.calls.lock().push(call);
    }
}

impl Mixer for RecordingMixer {
    fn items(&self) -> Vec<MixItem> {
        self.items.lock().clone()
    }

    fn set_volume(&self, id: ItemId, volume: u8, muted: bool) -> Result<(), AudioError> {
        self.record(MixerCall::SetVolume { id, volume, muted });
        Ok(())
    }

    fn set_default_endpoint(&self, id: ItemId) -> Result<(), AudioError> {
        self.record(MixerCall::SetDefaultEndpoint { id });
        Ok(())
    }
}
