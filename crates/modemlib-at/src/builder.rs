//! ModemBuilder -- fluent builder for constructing [`Modem`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! the serial port, SIM PIN, timeouts, and PDU codec before the transport
//! is opened and the IO task starts.
//!
//! # Example
//!
//! ```no_run
//! use modemlib_at::builder::ModemBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> modemlib_core::Result<()> {
//! let modem = ModemBuilder::new()
//!     .serial_port("/dev/serial0")
//!     .pin("4321")
//!     .command_timeout(Duration::from_secs(5))
//!     .build()
//!     .await?;
//! modem.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use modemlib_core::codec::PduCodec;
use modemlib_core::error::{Error, Result};
use modemlib_core::transport::Transport;
use modemlib_pdu::GsmPduCodec;
use modemlib_transport::DEFAULT_BAUD_RATE;

use crate::modem::{Modem, ModemSettings};

/// Fluent builder for [`Modem`].
pub struct ModemBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    pin: String,
    command_timeout: Duration,
    read_timeout: Duration,
    fragment_ttl: Duration,
    event_capacity: usize,
    codec: Option<Arc<dyn PduCodec>>,
}

impl Default for ModemBuilder {
    fn default() -> Self {
        ModemBuilder::new()
    }
}

impl ModemBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        ModemBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            pin: "1234".to_string(),
            command_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            fragment_ttl: Duration::from_secs(3600),
            event_capacity: 256,
            codec: None,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB2` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate (115200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Set the SIM PIN sent by [`Modem::start`] (default: `"1234"`).
    pub fn pin(mut self, pin: &str) -> Self {
        self.pin = pin.to_string();
        self
    }

    /// Set the deadline for each read or send step (default: 10s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set how long [`Modem::read_sms`] waits in total, including for the
    /// missing parts of a multipart message (default: 60s).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set how long fragments of an incomplete multipart message are kept
    /// before they are discarded (default: 1h).
    pub fn fragment_ttl(mut self, ttl: Duration) -> Self {
        self.fragment_ttl = ttl;
        self
    }

    /// Set the event channel capacity (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Use a custom PDU codec instead of [`GsmPduCodec`].
    pub fn codec(mut self, codec: Arc<dyn PduCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Build a [`Modem`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `modemlib-test-harness`) and for
    /// advanced use cases where the caller manages the transport
    /// lifecycle directly.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Modem> {
        if self.pin.is_empty() || self.pin.contains(['"', '\r', '\n']) {
            return Err(Error::InvalidParameter(format!(
                "invalid SIM PIN {:?}",
                self.pin
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be greater than zero".into(),
            ));
        }
        if self.command_timeout.is_zero()
            || self.read_timeout.is_zero()
            || self.fragment_ttl.is_zero()
        {
            return Err(Error::InvalidParameter("timeouts must be non-zero".into()));
        }

        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(GsmPduCodec::new()) as Arc<dyn PduCodec>);
        let settings = ModemSettings {
            pin: self.pin,
            command_timeout: self.command_timeout,
            read_timeout: self.read_timeout,
            fragment_ttl: self.fragment_ttl,
            event_capacity: self.event_capacity,
        };
        Ok(Modem::new(transport, codec, settings))
    }

    /// Build a [`Modem`] using a serial transport.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    /// The port is opened 8N1 without flow control.
    pub async fn build(self) -> Result<Modem> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;

        let transport = modemlib_transport::SerialTransport::open(port, self.baud_rate).await?;
        tracing::info!(port = %port, baud = self.baud_rate, "modem port opened");
        self.build_with_transport(Box::new(transport)).await
    }
}
