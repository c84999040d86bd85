//! Command queue tests

use maxmix_core::{
    CommandKey, CommandQueue, Flow, Message, MessageKind, SessionInfo, UpdateVolume,
};
use std::sync::Arc;

fn volume(id: i32, volume: u8) -> Message {
    Message::UpdateVolume(UpdateVolume {
        id,
        volume,
        muted: false,
        is_device: false,
        flow: Flow::Output,
    })
}

#[test]
fn test_same_key_coalesces() {
    let queue = CommandQueue::new(16);
    let key = CommandKey::for_item(MessageKind::UpdateVolume, 3);

    queue.enqueue(key, volume(3, 10));
    assert_eq!(queue.len(), 1);
    queue.enqueue(key, volume(3, 42));
    assert_eq!(queue.len(), 1);

    let (dequeued_key, message) = queue.dequeue().expect("queue empty");
    assert_eq!(dequeued_key, key);
    assert_eq!(message, volume(3, 42));
    assert!(queue.dequeue().is_none());
}

#[test]
fn test_replaced_entry_moves_to_tail() {
    let queue = CommandQueue::new(16);
    queue.push(volume(1, 10));
    queue.push(volume(2, 20));
    queue.push(volume(1, 11));

    assert_eq!(queue.dequeue().unwrap().1, volume(2, 20));
    assert_eq!(queue.dequeue().unwrap().1, volume(1, 11));
}

#[test]
fn test_distinct_items_do_not_coalesce() {
    let queue = CommandQueue::new(16);
    queue.push(volume(1, 10));
    queue.push(volume(2, 10));
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_global_key_ignores_payload() {
    let queue = CommandQueue::new(16);
    queue.push(Message::SessionInfo(SessionInfo {
        output_count: 1,
        ..SessionInfo::default()
    }));
    queue.push(Message::SessionInfo(SessionInfo {
        output_count: 2,
        ..SessionInfo::default()
    }));

    assert_eq!(queue.len(), 1);
    match queue.dequeue().unwrap().1 {
        Message::SessionInfo(info) => assert_eq!(info.output_count, 2),
        other => panic!("Expected SessionInfo, got {:?}", other),
    }
}

#[test]
fn test_overflow_evicts_oldest() {
    let queue = CommandQueue::new(4);
    for id in 0..6 {
        let evicted = queue.push(volume(id, id as u8));
        if id < 4 {
            assert!(evicted.is_none());
        } else {
            let (key, _) = evicted.expect("expected eviction");
            assert_eq!(key.item, Some(id - 4));
        }
    }

    assert_eq!(queue.len(), 4);
    let remaining: Vec<_> = std::iter::from_fn(|| queue.dequeue())
        .map(|(key, _)| key.item.unwrap())
        .collect();
    assert_eq!(remaining, vec![2, 3, 4, 5]);
}

#[test]
fn test_replacement_when_full_does_not_evict() {
    let queue = CommandQueue::new(2);
    queue.push(volume(1, 1));
    queue.push(volume(2, 2));
    assert!(queue.push(volume(1, 9)).is_none());
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_dequeue_empty_returns_none() {
    let queue = CommandQueue::default();
    assert!(queue.is_empty());
    assert!(queue.dequeue().is_none());
    assert_eq!(queue.capacity(), maxmix_core::DEFAULT_QUEUE_CAPACITY);
}

#[test]
fn test_concurrent_producers_keep_one_entry_per_key() {
    let queue = Arc::new(CommandQueue::new(64));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for v in 0..100u8 {
                    queue.push(volume(t, v));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(queue.len(), 4);
    while let Some((_, message)) = queue.dequeue() {
        assert_eq!(message, volume(message.item_id().unwrap(), 99));
    }
}
