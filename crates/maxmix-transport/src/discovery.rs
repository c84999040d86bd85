//! Device discovery
//!
//! A port is probed by opening it, writing a handshake request and waiting
//! for an acknowledgment. The packet revision of the answer is ignored; the
//! firmware revision carried in the acknowledgment body decides whether
//! the device is usable.

use maxmix_core::{Message, Registry};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::link::Link;
use crate::port::PortProvider;
use crate::stats::LinkStats;

/// Result of probing one port
#[derive(Debug)]
pub enum ProbeOutcome {
    /// A compatible device answered; the link stays open
    Compatible { link: Link, revision: u8 },
    /// A device answered with a revision outside the accepted set
    Incompatible { revision: u8 },
    /// Nothing answered within the handshake timeout
    NoResponse,
}

impl ProbeOutcome {
    pub fn is_compatible(&self) -> bool {
        matches!(self, ProbeOutcome::Compatible { .. })
    }
}

/// Handshake prober over a [`PortProvider`]
pub struct Discovery {
    provider: Arc<dyn PortProvider>,
    registry: Arc<Registry>,
    stats: Arc<LinkStats>,
    config: TransportConfig,
}

impl Discovery {
    pub fn new(
        provider: Arc<dyn PortProvider>,
        registry: Arc<Registry>,
        config: TransportConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            stats: Arc::new(LinkStats::new()),
            config,
        }
    }

    /// Share counters with an owning connection
    pub fn with_stats(mut self, stats: Arc<LinkStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub async fn available_ports(&self) -> Result<Vec<String>> {
        self.provider.available_ports().await
    }

    /// Probe a single port
    pub async fn probe(&self, name: &str) -> Result<ProbeOutcome> {
        let port = self.provider.open(name, &self.config.serial).await?;
        let mut link = Link::new(
            name,
            port,
            self.registry.clone(),
            self.stats.clone(),
            &self.config.serial,
        );

        debug!("Probing {}", name);
        link.send(&Message::HandshakeRequest).await?;

        let deadline = Instant::now() + self.config.handshake_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("{}: no handshake response", name);
                return Ok(ProbeOutcome::NoResponse);
            }

            let received = match link.poll_for(remaining.min(self.config.serial.read_timeout)).await {
                Ok(received) => received,
                Err(TransportError::ConnectionClosed) => return Ok(ProbeOutcome::NoResponse),
                Err(e) => return Err(e),
            };

            for result in received {
                match result {
                    Ok((Message::Acknowledgment(ack), _)) => {
                        let revision = ack.revision;
                        if self.config.is_compatible(revision) {
                            info!("Device found on {} (firmware revision {})", name, revision);
                            return Ok(ProbeOutcome::Compatible { link, revision });
                        }
                        return Ok(ProbeOutcome::Incompatible { revision });
                    }
                    Ok((other, _)) => debug!("{}: ignoring {:?} during handshake", name, other.kind()),
                    Err(_) => self.stats.record_error(),
                }
            }
        }
    }

    /// Probe every present port once, in order, reporting each result
    pub async fn sweep(&self) -> Result<Vec<(String, Result<ProbeOutcome>)>> {
        let ports = self.provider.available_ports().await?;
        let mut results = Vec::with_capacity(ports.len());
        for name in ports {
            let outcome = self.probe(&name).await;
            results.push((name, outcome));
        }
        Ok(results)
    }
}
