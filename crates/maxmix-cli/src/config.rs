//! Configuration file for the MaxMix CLI
//!
//! A missing file, or a file that only sets a few keys, falls back to the
//! defaults of every library.

use anyhow::{Context, Result};
use maxmix_audio::{DeviceDescriptor, SessionDescriptor, SimulatedHost};
use maxmix_client::DEFAULT_SERVICE_QUEUE_CAPACITY;
use maxmix_core::{Settings, DEFAULT_BAUD_RATE, PROTOCOL_REVISION};
use maxmix_transport::{SerialConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound command queue capacity
    pub queue_capacity: usize,
    pub serial: SerialSection,
    pub transport: TransportSection,
    /// Settings pushed to the device on connect
    pub device: Settings,
    /// Devices and sessions served by the simulated host
    pub host: HostSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_SERVICE_QUEUE_CAPACITY,
            serial: SerialSection::default(),
            transport: TransportSection::default(),
            device: Settings::default(),
            host: HostSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for SerialSection {
    fn default() -> Self {
        let serial = SerialConfig::default();
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: millis(serial.read_timeout),
            write_timeout_ms: millis(serial.write_timeout),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub handshake_timeout_ms: u64,
    pub discovery_retry_delay_ms: u64,
    pub liveness_window_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub compatible_revisions: Vec<u8>,
}

impl Default for TransportSection {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            handshake_timeout_ms: millis(transport.handshake_timeout),
            discovery_retry_delay_ms: millis(transport.discovery_retry_delay),
            liveness_window_ms: millis(transport.liveness_window),
            heartbeat_interval_ms: millis(transport.heartbeat_interval),
            compatible_revisions: vec![PROTOCOL_REVISION],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Device id of the default output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_output: Option<String>,
    /// Device id of the default input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_input: Option<String>,
    pub devices: Vec<DeviceDescriptor>,
    pub sessions: Vec<SessionDescriptor>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Default config file location
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maxmix")
        .join("config.toml")
}

impl Config {
    /// Load from a file, or defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn transport_config(&self) -> TransportConfig {
        let serial = SerialConfig {
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
            write_timeout: Duration::from_millis(self.serial.write_timeout_ms),
            ..SerialConfig::default()
        };

        TransportConfig {
            serial,
            ..TransportConfig::default()
        }
        .handshake_timeout(Duration::from_millis(self.transport.handshake_timeout_ms))
        .discovery_retry_delay(Duration::from_millis(self.transport.discovery_retry_delay_ms))
        .liveness_window(Duration::from_millis(self.transport.liveness_window_ms))
        .heartbeat_interval(Duration::from_millis(self.transport.heartbeat_interval_ms))
        .compatible_revisions(self.transport.compatible_revisions.iter().copied())
    }

    /// Build the simulated host described by the `[host]` section
    pub fn simulated_host(&self) -> Result<SimulatedHost> {
        let host = SimulatedHost::new();
        for device in &self.host.devices {
            host.add_device(device.clone());
        }
        for session in &self.host.sessions {
            if !self.host.devices.iter().any(|d| d.id == session.device_id) {
                anyhow::bail!(
                    "Session {} refers to unknown device {}",
                    session.id,
                    session.device_id
                );
            }
            host.add_session(session.clone());
        }
        for default in [&self.host.default_output, &self.host.default_input]
            .into_iter()
            .flatten()
        {
            host.set_default(default)
                .with_context(|| format!("Invalid default device: {}", default))?;
        }
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maxmix_audio::AudioBackend;
    use maxmix_core::Flow;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load("/nonexistent/maxmix/config.toml").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
            queue_capacity = 32

            [transport]
            liveness_window_ms = 5000

            [device]
            sleep_after_seconds = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.transport.liveness_window_ms, 5000);
        assert_eq!(config.transport.handshake_timeout_ms, 2500);
        assert_eq!(config.device.sleep_after_seconds, 12);
        assert_eq!(config.device.double_tap_time_ms, 500);

        let transport = config.transport_config();
        assert_eq!(transport.liveness_window, Duration::from_secs(5));
        assert_eq!(transport.serial.baud_rate, 115_200);
        assert!(transport.is_compatible(PROTOCOL_REVISION));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.host.devices.push(DeviceDescriptor::new("spk", "Speakers", Flow::Output));
        config.host.default_output = Some("spk".into());

        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_simulated_host_from_config() {
        let config: Config = toml::from_str(
            r#"
            [host]
            default_output = "spk"

            [[host.devices]]
            id = "spk"
            friendly_name = "Speakers (Realtek Audio)"

            [[host.devices]]
            id = "mic"
            friendly_name = "Microphone"
            flow = "input"
            volume = 30

            [[host.sessions]]
            id = "s1"
            device_id = "spk"
            process_key = "spotify.exe"
            process_name = "spotify"
            "#,
        )
        .unwrap();

        let host = config.simulated_host().unwrap();
        assert_eq!(host.devices(Flow::Output).unwrap().len(), 1);
        assert_eq!(host.devices(Flow::Input).unwrap()[0].volume, 30);
        assert_eq!(host.default_device(Flow::Output).unwrap().as_deref(), Some("spk"));
        assert_eq!(host.sessions("spk").unwrap().len(), 1);
    }

    #[test]
    fn test_session_on_unknown_device_rejected() {
        let mut config = Config::default();
        config
            .host
            .sessions
            .push(SessionDescriptor::new("s1", "nowhere", "app", "App"));
        assert!(config.simulated_host().is_err());
    }
}
