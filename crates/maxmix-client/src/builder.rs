//! Service builder pattern

use maxmix_audio::{MirrorEvent, Mixer};
use maxmix_core::{Registry, Settings};
use maxmix_transport::{PortProvider, TransportConfig};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::service::{MaxMix, ServiceEvent};

/// Queue capacity used by the service, large enough for a full resync
pub const DEFAULT_SERVICE_QUEUE_CAPACITY: usize = 64;

/// Builder for the [`MaxMix`] service
pub struct MaxMixBuilder {
    transport: TransportConfig,
    settings: Settings,
    queue_capacity: usize,
    registry: Registry,
}

impl MaxMixBuilder {
    pub fn new() -> Self {
        Self {
            transport: TransportConfig::default(),
            settings: Settings::default(),
            queue_capacity: DEFAULT_SERVICE_QUEUE_CAPACITY,
            registry: Registry::with_defaults(),
        }
    }

    /// Set discovery, liveness and serial parameters
    pub fn transport(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    /// Set the device settings sent on every connect
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the outbound queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Use a custom tag table
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Start discovery and the sync task on the current runtime
    pub fn start(
        self,
        provider: Arc<dyn PortProvider>,
        mixer: Arc<dyn Mixer>,
        mirror_events: mpsc::UnboundedReceiver<MirrorEvent>,
    ) -> (MaxMix, mpsc::UnboundedReceiver<ServiceEvent>) {
        MaxMix::spawn(
            provider,
            mixer,
            mirror_events,
            self.transport,
            self.settings,
            self.queue_capacity,
            self.registry,
        )
    }
}

impl Default for MaxMixBuilder {
    fn default() -> Self {
        Self::new()
    }
}
