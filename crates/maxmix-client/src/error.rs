//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("display data too large: {0} bytes")]
    DisplayTooLarge(usize),

    #[error("protocol error: {0}")]
    Protocol(#[from] maxmix_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] maxmix_transport::TransportError),

    #[error("audio error: {0}")]
    Audio(#[from] maxmix_audio::AudioError),
}
