//! Framed message I/O over one open port

use maxmix_core::{FrameAccumulator, Message, Registry, PROTOCOL_REVISION};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::config::SerialConfig;
use crate::error::{Result, TransportError};
use crate::port::BoxedPort;
use crate::stats::LinkStats;

const READ_CHUNK: usize = 256;

/// Outcome of decoding one received frame
pub type Received = maxmix_core::Result<(Message, u8)>;

/// An open port speaking the framed protocol
pub struct Link {
    name: String,
    port: BoxedPort,
    registry: Arc<Registry>,
    accumulator: FrameAccumulator,
    stats: Arc<LinkStats>,
    serial: SerialConfig,
    buf: Box<[u8; READ_CHUNK]>,
}

impl Link {
    pub fn new(
        name: &str,
        port: BoxedPort,
        registry: Arc<Registry>,
        stats: Arc<LinkStats>,
        config: &SerialConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            port,
            registry,
            accumulator: FrameAccumulator::new(),
            stats,
            serial: config.clone(),
            buf: Box::new([0u8; READ_CHUNK]),
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frame and write one message at the current protocol revision.
    ///
    /// The deadline grows with the frame length so a full frame is never cut
    /// off while it is still draining at the configured baud rate.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = self.registry.serialize(message, PROTOCOL_REVISION)?;

        let port = &mut self.port;
        let write = async {
            port.write_all(&frame).await?;
            port.flush().await
        };
        match tokio::time::timeout(self.serial.write_deadline(frame.len()), write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Err(_) => return Err(TransportError::Timeout),
        }

        self.stats.record_write(frame.len());
        trace!("{} <- {:?} ({} bytes)", self.name, message.kind(), frame.len());
        Ok(())
    }

    /// Read whatever arrives within the read timeout and decode every
    /// completed frame.
    ///
    /// An empty vector means nothing complete arrived in time. End of
    /// stream is reported as [`TransportError::ConnectionClosed`].
    pub async fn poll(&mut self) -> Result<Vec<Received>> {
        self.poll_for(self.serial.read_timeout).await
    }

    /// Like [`poll`](Self::poll) with an explicit wait
    pub async fn poll_for(&mut self, wait: Duration) -> Result<Vec<Received>> {
        let n = match tokio::time::timeout(wait, self.port.read(&mut self.buf[..])).await {
            Err(_) => return Ok(Vec::new()),
            Ok(Ok(0)) => return Err(TransportError::ConnectionClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(Vec::new()),
            Ok(Err(e)) => return Err(TransportError::Io(e)),
        };

        self.stats.record_read(n);
        let received = self
            .accumulator
            .push(&self.buf[..n])
            .into_iter()
            .map(|frame| frame.and_then(|f| self.registry.deserialize(&f)))
            .inspect(|result| match result {
                Ok((message, _)) => trace!("{} -> {:?}", self.name, message.kind()),
                Err(e) => debug!("{}: dropping frame: {}", self.name, e),
            })
            .collect();

        Ok(received)
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("pending", &self.accumulator.pending())
            .finish()
    }
}
