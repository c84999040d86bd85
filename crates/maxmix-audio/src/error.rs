//! Audio error types

use maxmix_core::ItemId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("item {0} is not a device")]
    NotADevice(ItemId),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("handle already released")]
    Released,

    #[error("audio backend error: {0}")]
    Backend(String),
}
