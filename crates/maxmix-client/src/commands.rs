//! Translation of mixer state into device commands

use maxmix_audio::{MixItem, MirrorEvent};
use maxmix_core::{
    AddItem, CommandKey, CommandQueue, DisplayMode, Flow, ItemId, Message, RemoveItem,
    SessionInfo, SetDefaultEndpoint, Settings, UpdateVolume,
};
use tracing::{debug, warn};

pub fn add_item(item: &MixItem) -> Message {
    Message::AddItem(AddItem {
        id: item.id,
        name: item.name.clone(),
        volume: item.volume,
        muted: item.muted,
        is_device: item.is_device(),
        flow: item.flow(),
    })
}

pub fn remove_item(id: ItemId, is_device: bool, flow: Flow) -> Message {
    Message::RemoveItem(RemoveItem {
        id,
        is_device,
        flow,
    })
}

pub fn update_volume(item: &MixItem) -> Message {
    Message::UpdateVolume(UpdateVolume {
        id: item.id,
        volume: item.volume,
        muted: item.muted,
        is_device: item.is_device(),
        flow: item.flow(),
    })
}

pub fn set_default(item: &MixItem) -> Message {
    Message::SetDefaultEndpoint(SetDefaultEndpoint {
        id: item.id,
        flow: item.flow(),
    })
}

/// Item counts for the device, with the default output as the current item
pub fn session_info(items: &[MixItem]) -> Message {
    let outputs: Vec<&MixItem> = items
        .iter()
        .filter(|i| i.is_device() && i.flow() == Flow::Output)
        .collect();
    let inputs = items
        .iter()
        .filter(|i| i.is_device() && i.flow() == Flow::Input)
        .count();
    let groups = items.iter().filter(|i| !i.is_device()).count();
    let current = outputs.iter().position(|i| i.is_default()).unwrap_or(0);

    Message::SessionInfo(SessionInfo {
        mode: DisplayMode::Output,
        current: saturate(current),
        output_count: saturate(outputs.len()),
        input_count: saturate(inputs),
        application_count: saturate(groups),
    })
}

fn saturate(count: usize) -> u8 {
    u8::try_from(count).unwrap_or(u8::MAX)
}

/// Everything the device needs after a (re)connect, in send order
pub fn resync(settings: &Settings, items: &[MixItem]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(items.len() + 2);
    messages.push(Message::Settings(settings.clone()));
    messages.extend(items.iter().map(add_item));
    messages.push(session_info(items));
    messages
}

/// Commands for one mirror event. `items` is only consulted when the
/// item counts or the current output changed.
pub fn for_event(event: &MirrorEvent, items: impl FnOnce() -> Vec<MixItem>) -> Vec<Message> {
    match event {
        MirrorEvent::DeviceCreated(item) | MirrorEvent::SessionGroupCreated(item) => {
            vec![add_item(item), session_info(&items())]
        }
        MirrorEvent::DeviceRemoved { id, flow } => {
            vec![remove_item(*id, true, *flow), session_info(&items())]
        }
        MirrorEvent::SessionGroupRemoved { id } => {
            vec![remove_item(*id, false, Flow::Output), session_info(&items())]
        }
        MirrorEvent::DeviceVolumeChanged(item) | MirrorEvent::SessionGroupVolumeChanged(item) => {
            vec![update_volume(item)]
        }
        MirrorEvent::DefaultChanged(item) if item.is_default() => {
            vec![set_default(item), session_info(&items())]
        }
        MirrorEvent::DefaultChanged(_) => Vec::new(),
    }
}

/// Enqueue with the message's own key, logging evictions
pub fn enqueue(queue: &CommandQueue, message: Message) {
    let key = CommandKey::of(&message);
    debug!("Queueing {:?}", key);
    if let Some((evicted, _)) = queue.enqueue(key, message) {
        warn!("Command queue full, dropped {:?}", evicted);
    }
}
