//! Serial port provider backed by `tokio-serial`

use async_trait::async_trait;
#[cfg(feature = "serial")]
use tracing::{debug, info};

use crate::config::SerialConfig;
#[cfg(feature = "serial")]
use crate::config::{SerialFlowControl, SerialParity};
use crate::error::{Result, TransportError};
use crate::port::{BoxedPort, PortProvider};

/// Opens real serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortProvider;

impl SerialPortProvider {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl PortProvider for SerialPortProvider {
    async fn available_ports(&self) -> Result<Vec<String>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| TransportError::ListFailed(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    async fn open(&self, name: &str, config: &SerialConfig) -> Result<BoxedPort> {
        use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let stop_bits = if config.stop_bits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        };
        let parity = match config.parity {
            SerialParity::None => Parity::None,
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
        };
        let flow_control = match config.flow_control {
            SerialFlowControl::None => FlowControl::None,
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
        };

        debug!("Opening {} @ {} baud", name, config.baud_rate);
        let port = tokio_serial::new(name, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|e| TransportError::OpenFailed {
                port: name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Serial port opened: {} @ {} baud", name, config.baud_rate);
        Ok(Box::new(port))
    }
}

// Stub implementation when serial feature is disabled
#[cfg(not(feature = "serial"))]
#[async_trait]
impl PortProvider for SerialPortProvider {
    async fn available_ports(&self) -> Result<Vec<String>> {
        Err(TransportError::ListFailed(
            "Serial feature not enabled. Compile with --features serial".into(),
        ))
    }

    async fn open(&self, name: &str, _config: &SerialConfig) -> Result<BoxedPort> {
        Err(TransportError::OpenFailed {
            port: name.to_string(),
            reason: "Serial feature not enabled. Compile with --features serial".into(),
        })
    }
}
