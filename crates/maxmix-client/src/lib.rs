//! MaxMix Client Library
//!
//! Wires an audio [`Mixer`](maxmix_audio::Mixer) to a MaxMix device:
//! mixer changes become queued device commands, and volume or default
//! changes made on the device are applied back to the mixer.
//!
//! # Example
//!
//! ```ignore
//! use maxmix_audio::{AudioMirror, SimulatedHost};
//! use maxmix_client::prelude::*;
//! use maxmix_transport::SerialPortProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (mirror, mirror_events) = AudioMirror::start(Arc::new(SimulatedHost::new()))?;
//!     let (service, mut events) = MaxMix::builder()
//!         .queue_capacity(64)
//!         .start(Arc::new(SerialPortProvider::new()), mirror, mirror_events);
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod commands;
pub mod error;
pub mod service;

pub use builder::{MaxMixBuilder, DEFAULT_SERVICE_QUEUE_CAPACITY};
pub use error::{ClientError, Result};
pub use service::{MaxMix, ServiceEvent};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::MaxMixBuilder;
    pub use crate::error::{ClientError, Result};
    pub use crate::service::{MaxMix, ServiceEvent};
    pub use maxmix_core::{Message, Settings};
}
