//! Framed write tests against pipes that drain at serial speed

use bytes::Bytes;
use maxmix_core::{DisplayData, FrameAccumulator, Message, Registry, MAX_FRAME_SIZE};
use maxmix_core::message::MAX_BODY_LEN;
use maxmix_transport::{Link, LinkStats, SerialConfig, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::task::JoinHandle;

const PIPE_CAPACITY: usize = 32;

fn full_display() -> Message {
    Message::DisplayData(DisplayData {
        pixels: Bytes::from(vec![0xA5; MAX_BODY_LEN]),
    })
}

fn link(port: DuplexStream, config: &SerialConfig) -> (Link, Arc<LinkStats>) {
    let stats = Arc::new(LinkStats::new());
    let link = Link::new(
        "COM3",
        Box::new(port),
        Arc::new(Registry::with_defaults()),
        stats.clone(),
        config,
    );
    (link, stats)
}

/// Device side that takes one small chunk per tick, like a UART
fn slow_reader(mut device: DuplexStream, tick: Duration) -> JoinHandle<Vec<Message>> {
    tokio::spawn(async move {
        let registry = Registry::with_defaults();
        let mut acc = FrameAccumulator::new();
        let mut buf = [0u8; PIPE_CAPACITY];
        let mut messages = Vec::new();
        loop {
            tokio::time::sleep(tick).await;
            let n = match device.read(&mut buf).await {
                Ok(0) | Err(_) => return messages,
                Ok(n) => n,
            };
            for frame in acc.push(&buf[..n]) {
                let (message, _) = registry.deserialize(&frame.unwrap()).unwrap();
                messages.push(message);
            }
        }
    })
}

#[tokio::test]
async fn test_full_frame_survives_slow_drain() {
    // 255 bytes at 9600 baud spend about 265ms on the wire
    let config = SerialConfig {
        baud_rate: 9600,
        ..SerialConfig::default()
    };
    let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
    let reader = slow_reader(device, Duration::from_millis(10));
    let (mut link, stats) = link(host, &config);

    let message = full_display();
    link.send(&message).await.expect("full frame was cut off");
    link.send(&Message::Heartbeat).await.unwrap();
    drop(link);

    let received = reader.await.unwrap();
    assert_eq!(received, vec![message, Message::Heartbeat]);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.writes, 2);
    assert!(snapshot.write_bytes > MAX_FRAME_SIZE as u64);
}

#[tokio::test]
async fn test_stalled_port_still_times_out() {
    let config = SerialConfig::default();
    // nobody reads the device side, so the pipe fills and stays full
    let (host, _device) = tokio::io::duplex(PIPE_CAPACITY);
    let (mut link, stats) = link(host, &config);

    let result = tokio::time::timeout(Duration::from_secs(2), link.send(&full_display()))
        .await
        .expect("send never gave up");
    assert!(matches!(result, Err(TransportError::Timeout)));
    assert_eq!(stats.snapshot().writes, 0);
}
