//! The control surface the device drives

use maxmix_core::ItemId;

use crate::error::Result;
use crate::model::MixItem;

/// Anything that exposes mixable items and accepts volume/default changes
pub trait Mixer: Send + Sync {
    /// Every device and session group currently known
    fn items(&self) -> Vec<MixItem>;

    /// Set volume (0-100) and mute of a device or session group
    fn set_volume(&self, id: ItemId, volume: u8, muted: bool) -> Result<()>;

    /// Make a device the default endpoint of its direction
    fn set_default_endpoint(&self, id: ItemId) -> Result<()>;
}
