//! Transport implementations for modemlib.
//!
//! This crate provides the concrete I/O collaborators of the AT engine:
//!
//! - [`SerialTransport`]: the modem's UART or USB virtual COM port, an
//!   implementation of [`Transport`](modemlib_core::Transport)
//! - [`ProcessCapture`]: voice-call recording through an external recorder
//!   process, an implementation of
//!   [`AudioCapture`](modemlib_core::AudioCapture)
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
//! transport.send(b"AT+CSQ\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod serial;

pub use audio::{CaptureStreams, ProcessCapture};
pub use serial::{DEFAULT_BAUD_RATE, LineSettings, MODEM_LINE, SerialConfig, SerialTransport};
