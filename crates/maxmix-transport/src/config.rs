//! Serial and link timing configuration

use maxmix_core::{DEFAULT_BAUD_RATE, PROTOCOL_REVISION};
use std::collections::BTreeSet;
use std::time::Duration;

/// Serial port parameters
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: u8,
    /// Stop bits (default: 1)
    pub stop_bits: u8,
    /// Parity (default: none)
    pub parity: SerialParity,
    /// Flow control (default: none)
    pub flow_control: SerialFlowControl,
    /// Per-call read timeout (default: 20ms)
    pub read_timeout: Duration,
    /// Per-call write timeout (default: 20ms)
    pub write_timeout: Duration,
}

/// Serial parity options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerialParity {
    #[default]
    None,
    Odd,
    Even,
}

/// Serial flow control options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerialFlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
            read_timeout: Duration::from_millis(20),
            write_timeout: Duration::from_millis(20),
        }
    }
}

impl SerialConfig {
    /// Bits on the wire per byte: start bit, data bits, parity and stop bits
    pub fn bits_per_byte(&self) -> u32 {
        let parity = u32::from(self.parity != SerialParity::None);
        1 + u32::from(self.data_bits) + parity + u32::from(self.stop_bits)
    }

    /// Deadline for writing `len` bytes: the write timeout plus the time the
    /// bytes need on the wire at the configured baud rate
    pub fn write_deadline(&self, len: usize) -> Duration {
        let bits = len as u64 * u64::from(self.bits_per_byte());
        let micros = bits * 1_000_000 / u64::from(self.baud_rate.max(1));
        self.write_timeout + Duration::from_micros(micros)
    }
}

/// Discovery and connection timing
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub serial: SerialConfig,
    /// How long a probed port has to answer the handshake
    pub handshake_timeout: Duration,
    /// Pause between two discovery sweeps
    pub discovery_retry_delay: Duration,
    /// Silence after which a connected device is considered gone
    pub liveness_window: Duration,
    /// Idle time after which a heartbeat is written
    pub heartbeat_interval: Duration,
    /// Firmware revisions accepted during the handshake
    pub compatible_revisions: BTreeSet<u8>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            handshake_timeout: Duration::from_millis(2500),
            discovery_retry_delay: Duration::from_millis(250),
            liveness_window: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(1),
            compatible_revisions: BTreeSet::from([PROTOCOL_REVISION]),
        }
    }
}

impl TransportConfig {
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn discovery_retry_delay(mut self, delay: Duration) -> Self {
        self.discovery_retry_delay = delay;
        self
    }

    pub fn liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn compatible_revisions(mut self, revisions: impl IntoIterator<Item = u8>) -> Self {
        self.compatible_revisions = revisions.into_iter().collect();
        self
    }

    pub fn is_compatible(&self, revision: u8) -> bool {
        self.compatible_revisions.contains(&revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_byte() {
        let mut config = SerialConfig::default();
        assert_eq!(config.bits_per_byte(), 10);

        config.parity = SerialParity::Even;
        config.stop_bits = 2;
        assert_eq!(config.bits_per_byte(), 12);
    }

    #[test]
    fn test_write_deadline_covers_wire_time() {
        let config = SerialConfig::default();
        assert_eq!(config.write_deadline(0), Duration::from_millis(20));

        // 255 bytes of 8-N-1 at 115200 baud take 22.135ms on the wire
        let deadline = config.write_deadline(255);
        assert_eq!(deadline, Duration::from_millis(20) + Duration::from_micros(22_135));
        assert!(deadline > Duration::from_millis(42));
    }

    #[test]
    fn test_write_deadline_slow_baud() {
        let config = SerialConfig {
            baud_rate: 9600,
            ..SerialConfig::default()
        };
        // 2550 bits at 9600 baud
        assert_eq!(
            config.write_deadline(255),
            Duration::from_millis(20) + Duration::from_micros(265_625)
        );
    }
}
