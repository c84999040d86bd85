//! Connection state machine
//!
//! ```text
//!               start / link lost
//! Disconnected ──────────────────▶ Discovering
//!      ▲                                │ compatible acknowledgment
//!      │                                ▼
//!   TimedOut ◀──── silence ──────── Connected
//! ```
//!
//! End of stream or an I/O failure on the open port closes the link the
//! same way a timeout does.
//!
//! The machine runs on its own task. It owns the port, reports through an
//! unbounded event channel and pulls outbound commands from a shared
//! [`CommandQueue`]. A command is written only after the device signalled
//! readiness with an acknowledgment.

use maxmix_core::{CommandQueue, Message, Registry, PROTOCOL_REVISION};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::discovery::{Discovery, ProbeOutcome};
use crate::error::TransportError;
use crate::link::Link;
use crate::port::PortProvider;
use crate::stats::{LinkStats, LinkStatsSnapshot};

/// Connection state, owned by the connection task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Discovering,
    Connected,
    TimedOut,
}

/// Events reported by the connection task
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A compatible device answered the handshake on a port
    DeviceDiscovered { port: String },
    /// The link is up and ready for commands
    DeviceConnected { port: String },
    /// The link was closed
    DeviceDisconnected { port: String },
    /// A device answered with a firmware revision outside the accepted set
    FirmwareIncompatible { port: String, revision: u8 },
    /// A message arrived from the device
    MessageReceived { tag: u8, message: Message },
}

/// Handle to a running connection task
pub struct Connection {
    state: Arc<RwLock<ConnectionState>>,
    port: Arc<RwLock<Option<String>>>,
    stats: Arc<LinkStats>,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Spawn the connection task on the current runtime
    pub fn start(
        provider: Arc<dyn PortProvider>,
        queue: Arc<CommandQueue>,
        registry: Arc<Registry>,
        config: TransportConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let port = Arc::new(RwLock::new(None));
        let stats = Arc::new(LinkStats::new());
        let stop = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            discovery: Discovery::new(provider, registry.clone(), config.clone())
                .with_stats(stats.clone()),
            registry,
            queue,
            config,
            state: state.clone(),
            port: port.clone(),
            stats: stats.clone(),
            stop: stop.clone(),
            events: tx,
            incompatible: HashSet::new(),
        };
        let handle = tokio::spawn(driver.run());

        let connection = Self {
            state,
            port,
            stats,
            stop,
            handle: Mutex::new(Some(handle)),
        };
        (connection, rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Name of the connected port
    pub fn port_name(&self) -> Option<String> {
        self.port.read().clone()
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Ask the task to stop and wait until the port is closed
    pub async fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Connection task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

enum LinkEnd {
    Stopped,
    TimedOut,
    Lost(TransportError),
}

struct Driver {
    discovery: Discovery,
    registry: Arc<Registry>,
    queue: Arc<CommandQueue>,
    config: TransportConfig,
    state: Arc<RwLock<ConnectionState>>,
    port: Arc<RwLock<Option<String>>>,
    stats: Arc<LinkStats>,
    stop: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    /// Ports that reported an unusable firmware, skipped while present
    incompatible: HashSet<String>,
}

impl Driver {
    async fn run(mut self) {
        info!("Connection task started");
        while !self.stopped() {
            self.set_state(ConnectionState::Discovering);
            let Some(link) = self.discover().await else {
                break;
            };

            let name = link.name().to_string();
            let end = self.serve(link).await;
            *self.port.write() = None;
            self.emit(ConnectionEvent::DeviceDisconnected { port: name.clone() });

            match end {
                LinkEnd::TimedOut => info!("Device on {} timed out, rediscovering", name),
                LinkEnd::Stopped => info!("Closed {}", name),
                LinkEnd::Lost(e) => warn!("Lost {}: {}, rediscovering", name, e),
            }
            self.set_state(ConnectionState::Disconnected);
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Connection task stopped");
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("Connection state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // receiver gone means nobody is listening, keep running
        let _ = self.events.send(event);
    }

    /// Sweep ports until a compatible device answers or a stop is requested
    async fn discover(&mut self) -> Option<Link> {
        loop {
            if self.stopped() {
                return None;
            }

            let ports = match self.discovery.available_ports().await {
                Ok(ports) => ports,
                Err(e) => {
                    warn!("Failed to list ports: {}", e);
                    Vec::new()
                }
            };
            self.incompatible.retain(|p| ports.contains(p));

            for name in ports {
                if self.stopped() {
                    return None;
                }
                if self.incompatible.contains(&name) {
                    continue;
                }

                match self.discovery.probe(&name).await {
                    Ok(ProbeOutcome::Compatible { link, .. }) => {
                        self.emit(ConnectionEvent::DeviceDiscovered { port: name });
                        return Some(link);
                    }
                    Ok(ProbeOutcome::Incompatible { revision }) => {
                        warn!("Incompatible firmware revision {} on {}", revision, name);
                        self.emit(ConnectionEvent::FirmwareIncompatible {
                            port: name.clone(),
                            revision,
                        });
                        self.incompatible.insert(name);
                    }
                    Ok(ProbeOutcome::NoResponse) => {}
                    Err(e) => debug!("Skipping {}: {}", name, e),
                }
            }

            tokio::time::sleep(self.config.discovery_retry_delay).await;
        }
    }

    /// Drive a connected link until it goes silent, the port fails, or a
    /// stop is requested
    async fn serve(&mut self, mut link: Link) -> LinkEnd {
        let name = link.name().to_string();
        *self.port.write() = Some(name.clone());
        self.set_state(ConnectionState::Connected);
        info!("Connected to device on {}", name);
        self.emit(ConnectionEvent::DeviceConnected { port: name.clone() });

        // the handshake acknowledgment counts as a ready signal
        let mut ready = true;
        let mut last_message = Instant::now();
        let mut last_write = Instant::now();

        loop {
            if self.stopped() {
                return LinkEnd::Stopped;
            }

            match link.poll().await {
                Ok(received) => {
                    for result in received {
                        match result {
                            Ok((message, revision)) => {
                                last_message = Instant::now();
                                if revision != PROTOCOL_REVISION {
                                    self.stats.record_error();
                                    warn!(
                                        "{}: dropping {:?} with revision {}",
                                        name,
                                        message.kind(),
                                        revision
                                    );
                                    continue;
                                }
                                self.dispatch(message, &mut ready);
                            }
                            Err(_) => self.stats.record_error(),
                        }
                    }
                }
                Err(e) if e.is_link_lost() => return LinkEnd::Lost(e),
                Err(e) => {
                    self.stats.record_error();
                    debug!("{}: read failed: {}", name, e);
                    tokio::time::sleep(self.config.serial.read_timeout).await;
                }
            }

            if ready {
                if let Some((key, message)) = self.queue.dequeue() {
                    match link.send(&message).await {
                        Ok(()) => {
                            ready = false;
                            last_write = Instant::now();
                        }
                        Err(e) if e.is_link_lost() => return LinkEnd::Lost(e),
                        Err(e) => {
                            self.stats.record_error();
                            warn!("{}: failed to send {:?}: {}", name, key.kind, e);
                        }
                    }
                }
            }

            if last_write.elapsed() >= self.config.heartbeat_interval {
                if let Err(e) = link.send(&Message::Heartbeat).await {
                    if e.is_link_lost() {
                        return LinkEnd::Lost(e);
                    }
                    self.stats.record_error();
                    debug!("{}: heartbeat failed: {}", name, e);
                }
                last_write = Instant::now();
            }

            if last_message.elapsed() >= self.config.liveness_window {
                self.set_state(ConnectionState::TimedOut);
                warn!("No message from {} in {:?}", name, self.config.liveness_window);
                return LinkEnd::TimedOut;
            }
        }
    }

    fn dispatch(&self, message: Message, ready: &mut bool) {
        match message {
            Message::Acknowledgment(_) => *ready = true,
            Message::Heartbeat => {}
            message => {
                let kind = message.kind();
                match self.registry.tag_of(kind) {
                    Some(tag) => self.emit(ConnectionEvent::MessageReceived { tag, message }),
                    None => debug!("Dropping unregistered {:?}", kind),
                }
            }
        }
    }
}
