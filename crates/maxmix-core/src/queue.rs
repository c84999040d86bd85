//! Coalescing outbound command queue
//!
//! A fixed-capacity FIFO that holds at most one pending command per key.
//! Enqueuing a key that is already present drops the older command and
//! appends the new one at the tail, so a value that changes quickly is
//! delivered once, with its latest content.
//!
//! # Example
//!
//! ```
//! use maxmix_core::{CommandKey, CommandQueue, Message, MessageKind};
//!
//! let queue = CommandQueue::new(4);
//! queue.enqueue(CommandKey::new(MessageKind::Heartbeat), Message::Heartbeat);
//! queue.enqueue(CommandKey::new(MessageKind::Heartbeat), Message::Heartbeat);
//! assert_eq!(queue.len(), 1);
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::message::{ItemId, Message, MessageKind};
use crate::DEFAULT_QUEUE_CAPACITY;

/// Coalescing key: the message kind, plus the item for per-item commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub kind: MessageKind,
    pub item: Option<ItemId>,
}

impl CommandKey {
    /// Key for a global command
    pub fn new(kind: MessageKind) -> Self {
        Self { kind, item: None }
    }

    /// Key for a command about one item
    pub fn for_item(kind: MessageKind, item: ItemId) -> Self {
        Self {
            kind,
            item: Some(item),
        }
    }

    /// Natural key of a message
    pub fn of(message: &Message) -> Self {
        Self {
            kind: message.kind(),
            item: message.item_id(),
        }
    }
}

/// Bounded queue with per-key replacement
pub struct CommandQueue {
    entries: Mutex<VecDeque<(CommandKey, Message)>>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Queue a command, replacing any pending command with the same key.
    ///
    /// When the queue is full and the key is new, the oldest command is
    /// evicted and returned.
    pub fn enqueue(&self, key: CommandKey, message: Message) -> Option<(CommandKey, Message)> {
        let mut entries = self.entries.lock();

        if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
            entries.remove(pos);
            entries.push_back((key, message));
            return None;
        }

        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back((key, message));
        evicted
    }

    /// Queue a command under its natural key
    pub fn push(&self, message: Message) -> Option<(CommandKey, Message)> {
        self.enqueue(CommandKey::of(&message), message)
    }

    /// Take the oldest command. Never blocks.
    pub fn dequeue(&self) -> Option<(CommandKey, Message)> {
        self.entries.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every pending command
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
