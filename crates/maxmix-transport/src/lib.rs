//! MaxMix Transport Layer
//!
//! This crate owns the serial side of the link:
//! - Port abstraction ([`PortProvider`], [`SerialIo`]) and a `tokio-serial` backend
//! - Handshake-based device discovery ([`Discovery`])
//! - The connection state machine with liveness and heartbeat ([`Connection`])
//! - Link counters ([`LinkStats`])

pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod link;
pub mod port;
pub mod serial;
pub mod stats;

pub use config::{SerialConfig, SerialFlowControl, SerialParity, TransportConfig};
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use discovery::{Discovery, ProbeOutcome};
pub use error::{Result, TransportError};
pub use link::Link;
pub use port::{BoxedPort, PortProvider, SerialIo};
pub use serial::SerialPortProvider;
pub use stats::{LinkStats, LinkStatsSnapshot};
