//! Serial port transport for modem communication.
//!
//! [`SerialTransport`] implements [`Transport`] for the UART or USB virtual
//! COM port a cellular modem is attached to. The line format is fixed at 8
//! data bits, 1 stop bit, no parity and no flow control ([`MODEM_LINE`]);
//! only the device path and baud rate are configurable.
//!
//! # Example
//!
//! ```no_run
//! use modemlib_transport::SerialTransport;
//! use modemlib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> modemlib_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/serial0", 115_200).await?;
//!
//! transport.send(b"AT\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use modemlib_core::error::{Error, Result};
use modemlib_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilder, SerialPortBuilderExt, SerialStream};

/// Baud rate of the modems this crate targets.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Character framing and flow control applied to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

/// 8N1 without flow control, the only format AT modems are driven with here.
pub const MODEM_LINE: LineSettings = LineSettings {
    data_bits: tokio_serial::DataBits::Eight,
    stop_bits: tokio_serial::StopBits::One,
    parity: tokio_serial::Parity::None,
    flow_control: tokio_serial::FlowControl::None,
};

impl LineSettings {
    fn apply(&self, builder: SerialPortBuilder) -> SerialPortBuilder {
        builder
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity)
            .flow_control(self.flow_control)
    }
}

/// Where the modem is attached and how fast it talks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB2`, `COM3`).
    pub path: String,
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Config for `path` at [`DEFAULT_BAUD_RATE`].
    pub fn new(path: &str) -> Self {
        SerialConfig {
            path: path.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// The `tokio_serial` builder this config opens, framed as [`MODEM_LINE`].
    pub fn port_builder(&self) -> SerialPortBuilder {
        MODEM_LINE.apply(tokio_serial::new(&self.path, self.baud_rate))
    }
}

fn io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

/// Serial port transport for modem communication.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open `port` at `baud_rate`, 8N1 without flow control.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with_config(&SerialConfig::new(port).with_baud_rate(baud_rate)).await
    }

    /// Open the port described by `config`.
    pub async fn open_with_config(config: &SerialConfig) -> Result<Self> {
        tracing::debug!(port = %config.path, baud_rate = config.baud_rate, line = ?MODEM_LINE, "opening modem port");

        let mut stream = config.port_builder().open_native_async().map_err(|e| {
            tracing::error!(port = %config.path, error = %e, "failed to open modem port");
            Error::Transport(format!("failed to open serial port {}: {e}", config.path))
        })?;

        // DTR low means "hang up and return to command mode" to a modem.
        if let Err(e) = stream.write_data_terminal_ready(true) {
            tracing::warn!(port = %config.path, error = %e, "failed to assert DTR");
        }

        tracing::info!(port = %config.path, baud_rate = config.baud_rate, "modem port open");
        Ok(SerialTransport {
            port: Some(stream),
            port_name: config.path.clone(),
        })
    }

    /// Device path this transport was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(port = %self.port_name, data = %String::from_utf8_lossy(data).escape_debug(), "write");

        port.write_all(data).await.map_err(io_error)?;
        port.flush().await.map_err(io_error)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, "read");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "modem port read failed");
                Err(io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "flush before close failed");
            }
            tracing::info!(port = %self.port_name, "modem port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}
