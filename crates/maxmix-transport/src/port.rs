//! Port abstraction
//!
//! The connection logic only needs a byte pipe and a way to list and open
//! ports. Real hardware goes through [`SerialPortProvider`](crate::serial::SerialPortProvider);
//! tests plug in in-memory pipes.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::SerialConfig;
use crate::error::Result;

/// A bidirectional byte stream to one device
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialIo for T {}

/// An open port. Dropping it closes the port.
pub type BoxedPort = Box<dyn SerialIo>;

/// Source of candidate ports
#[async_trait]
pub trait PortProvider: Send + Sync {
    /// Names of the ports currently present
    async fn available_ports(&self) -> Result<Vec<String>>;

    /// Open a port by name
    async fn open(&self, name: &str, config: &SerialConfig) -> Result<BoxedPort>;
}
