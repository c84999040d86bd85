//! Handshake probe tests

use maxmix_core::{Message, Registry, PROTOCOL_REVISION};
use maxmix_test_utils::VirtualPorts;
use maxmix_transport::{Discovery, ProbeOutcome, TransportConfig, TransportError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn discovery(ports: &VirtualPorts) -> Discovery {
    Discovery::new(
        Arc::new(ports.clone()),
        Arc::new(Registry::with_defaults()),
        TransportConfig::default().handshake_timeout(Duration::from_millis(250)),
    )
}

#[tokio::test]
async fn test_probe_compatible_device_keeps_link() {
    let ports = VirtualPorts::new();
    let device = ports.attach_device("ttyUSB0", PROTOCOL_REVISION);

    let outcome = discovery(&ports).probe("ttyUSB0").await.unwrap();
    match outcome {
        ProbeOutcome::Compatible { link, revision } => {
            assert_eq!(revision, PROTOCOL_REVISION);
            assert_eq!(link.name(), "ttyUSB0");
        }
        other => panic!("Expected Compatible, got {:?}", other),
    }
    assert_eq!(device.received(), vec![Message::HandshakeRequest]);
}

#[tokio::test]
async fn test_probe_accepts_any_packet_revision() {
    let ports = VirtualPorts::new();
    let mut handle = ports.attach("ttyUSB0");

    // a device that answers with an odd packet revision but a good body
    tokio::spawn(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = handle.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let _ = stream.read(&mut buf).await;
        let ack = Registry::with_defaults()
            .serialize(
                &Message::Acknowledgment(maxmix_core::Acknowledgment {
                    revision: PROTOCOL_REVISION,
                }),
                42,
            )
            .unwrap();
        stream.write_all(&ack).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let outcome = discovery(&ports).probe("ttyUSB0").await.unwrap();
    assert!(outcome.is_compatible());
}

#[tokio::test]
async fn test_probe_incompatible_revision() {
    let ports = VirtualPorts::new();
    let _device = ports.attach_device("ttyUSB0", 3);

    let outcome = discovery(&ports).probe("ttyUSB0").await.unwrap();
    assert!(matches!(outcome, ProbeOutcome::Incompatible { revision: 3 }));
}

#[tokio::test]
async fn test_extra_compatible_revisions() {
    let ports = VirtualPorts::new();
    let _device = ports.attach_device("ttyUSB0", 3);
    let discovery = Discovery::new(
        Arc::new(ports.clone()),
        Arc::new(Registry::with_defaults()),
        TransportConfig::default().compatible_revisions([1, 3]),
    );

    assert!(discovery.probe("ttyUSB0").await.unwrap().is_compatible());
}

#[tokio::test]
async fn test_probe_silent_port_times_out() {
    let ports = VirtualPorts::new();
    let _handle = ports.attach("ttyS0");

    let start = Instant::now();
    let outcome = discovery(&ports).probe("ttyS0").await.unwrap();
    assert!(matches!(outcome, ProbeOutcome::NoResponse));
    assert!(start.elapsed() >= Duration::from_millis(250));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_probe_unopenable_port_errors() {
    let ports = VirtualPorts::new();
    ports.attach_broken("ttyS1");

    let err = discovery(&ports).probe("ttyS1").await.unwrap_err();
    assert!(matches!(err, TransportError::OpenFailed { ref port, .. } if port == "ttyS1"));
}

#[tokio::test]
async fn test_sweep_reports_every_port() {
    let ports = VirtualPorts::new();
    ports.attach_broken("A");
    let _device = ports.attach_device("B", PROTOCOL_REVISION);
    let _old = ports.attach_device("C", 7);

    let results = discovery(&ports).sweep().await.unwrap();
    let names: Vec<_> = results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert!(results[0].1.is_err());
    assert!(results[1].1.as_ref().unwrap().is_compatible());
    assert!(matches!(
        results[2].1,
        Ok(ProbeOutcome::Incompatible { revision: 7 })
    ));
}
