//! Frame and registry tests for MaxMix core

use bytes::Bytes;
use maxmix_core::{
    cobs, Acknowledgment, AddItem, DisplayData, DisplayMode, Error, Flow, FrameAccumulator,
    Message, MessageKind, Registry, SessionInfo, Settings, UpdateVolume, DELIMITER,
    PROTOCOL_REVISION,
};

// ============================================================================
// Serialize / Deserialize
// ============================================================================

#[test]
fn test_serialize_update_volume_frame() {
    let registry = Registry::with_defaults();
    let message = Message::UpdateVolume(UpdateVolume {
        id: 3,
        volume: 42,
        muted: false,
        is_device: false,
        flow: Flow::Output,
    });

    let frame = registry.serialize(&message, PROTOCOL_REVISION).expect("serialize failed");
    assert_eq!(frame.last(), Some(&DELIMITER));
    assert!(!frame[..frame.len() - 1].contains(&DELIMITER));

    let (decoded, revision) = registry.deserialize(&frame).expect("deserialize failed");
    assert_eq!(revision, PROTOCOL_REVISION);
    assert_eq!(decoded, message);
}

#[test]
fn test_serialize_settings_and_session_info() {
    let registry = Registry::with_defaults();

    let settings = Message::Settings(Settings {
        sleep_after_seconds: 30,
        continuous_scroll: false,
        ..Settings::default()
    });
    let frame = registry.serialize(&settings, 1).unwrap();
    assert_eq!(registry.deserialize(&frame).unwrap().0, settings);

    let info = Message::SessionInfo(SessionInfo {
        mode: DisplayMode::Application,
        current: 2,
        output_count: 3,
        input_count: 1,
        application_count: 7,
    });
    let frame = registry.serialize(&info, 1).unwrap();
    assert_eq!(registry.deserialize(&frame).unwrap().0, info);
}

#[test]
fn test_add_item_name_survives_framing() {
    let registry = Registry::with_defaults();
    let message = Message::AddItem(AddItem {
        id: i32::MIN,
        name: "System Sounds".into(),
        volume: 100,
        muted: false,
        is_device: false,
        flow: Flow::Output,
    });

    let frame = registry.serialize(&message, 1).unwrap();
    match registry.deserialize(&frame).unwrap().0 {
        Message::AddItem(item) => {
            assert_eq!(item.id, i32::MIN);
            assert_eq!(item.name, "SYSTEM SOUNDS");
        }
        other => panic!("Expected AddItem, got {:?}", other),
    }
}

#[test]
fn test_revision_is_carried_not_checked() {
    let registry = Registry::with_defaults();
    let frame = registry
        .serialize(&Message::Acknowledgment(Acknowledgment { revision: 1 }), 9)
        .unwrap();
    let (message, revision) = registry.deserialize(&frame).unwrap();
    assert_eq!(revision, 9);
    assert_eq!(message.kind(), MessageKind::Acknowledgment);
}

#[test]
fn test_display_data_at_limit() {
    let registry = Registry::with_defaults();
    let message = Message::DisplayData(DisplayData {
        pixels: Bytes::from((0..250u32).map(|i| (i % 256) as u8).collect::<Vec<_>>()),
    });

    let frame = registry.serialize(&message, 1).unwrap();
    assert!(frame.len() <= maxmix_core::MAX_FRAME_SIZE);
    assert_eq!(registry.deserialize(&frame).unwrap().0, message);
}

// ============================================================================
// Registry Errors
// ============================================================================

#[test]
fn test_unregistered_kind_fails_to_serialize() {
    let mut registry = Registry::new();
    registry.register(1, MessageKind::HandshakeRequest);

    assert_eq!(
        registry.serialize(&Message::Heartbeat, 1),
        Err(Error::UnregisteredKind(MessageKind::Heartbeat))
    );
    assert!(registry.serialize(&Message::HandshakeRequest, 1).is_ok());
}

#[test]
fn test_unknown_tag_fails_to_deserialize() {
    let registry = Registry::with_defaults();
    let frame = cobs::encode(&[1, 200, 3]).unwrap();
    assert_eq!(registry.deserialize(&frame), Err(Error::UnknownTag(200)));
}

#[test]
fn test_reregistered_tag_decodes_as_new_kind() {
    let sender = Registry::with_defaults();
    let mut receiver = Registry::with_defaults();
    receiver.register(3, MessageKind::HandshakeRequest);

    let frame = sender.serialize(&Message::Heartbeat, 1).unwrap();
    let (message, _) = receiver.deserialize(&frame).unwrap();
    assert_eq!(message, Message::HandshakeRequest);
}

// ============================================================================
// Corruption
// ============================================================================

#[test]
fn test_truncated_frame_rejected() {
    let registry = Registry::with_defaults();
    let frame = registry
        .serialize(&Message::Settings(Settings::default()), 1)
        .unwrap();

    // drop the last data byte, keep the delimiter
    let mut cut = frame[..frame.len() - 2].to_vec();
    cut.push(DELIMITER);
    assert!(registry.deserialize(&cut).is_err());
}

#[test]
fn test_overrunning_code_rejected() {
    let registry = Registry::with_defaults();
    let bad = [0x20, 0x01, 0x03, 0x03, 0x00];
    assert!(matches!(
        registry.deserialize(&bad),
        Err(Error::CodeOverrun { code: 0x20, .. })
    ));
}

#[test]
fn test_corrupt_frame_does_not_poison_stream() {
    let registry = Registry::with_defaults();
    let mut stream = vec![0x09, 0x01, 0x00];
    stream.extend(registry.serialize(&Message::Heartbeat, 1).unwrap());

    let mut acc = FrameAccumulator::new();
    let results: Vec<_> = acc
        .push(&stream)
        .into_iter()
        .map(|frame| frame.and_then(|f| registry.deserialize(&f)))
        .collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());
    assert_eq!(results[1].as_ref().unwrap().0, Message::Heartbeat);
}
