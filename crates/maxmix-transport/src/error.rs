//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("failed to list ports: {0}")]
    ListFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] maxmix_core::Error),
}

impl TransportError {
    /// The port itself is gone: end of stream or an OS level failure
    pub fn is_link_lost(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Io(_))
    }
}
