//! # modemlib -- Asynchronous AT Modem Control
//!
//! `modemlib` drives a cellular modem over its serial port with AT
//! commands: placing, answering and ending voice calls, reporting caller
//! ID, and sending and receiving SMS as PDUs, including reassembly of
//! messages that arrive in several parts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use modemlib::{ModemBuilder, ModemEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let modem = ModemBuilder::new()
//!         .serial_port("/dev/serial0")
//!         .pin("1234")
//!         .build()
//!         .await?;
//!     let mut events = modem.subscribe();
//!     modem.start().await?;
//!
//!     modem.send_sms("hello", "+15551234567").await?;
//!     while let Ok(event) = events.recv().await {
//!         if let ModemEvent::Sms(msg) = event {
//!             println!("{msg}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                   | Purpose                                          |
//! |-------------------------|--------------------------------------------------|
//! | `modemlib-core`         | Traits ([`Transport`], [`PduCodec`], [`AudioCapture`]), types, errors |
//! | `modemlib-transport`    | Serial port and recorder-process implementations |
//! | `modemlib-pdu`          | GSM 03.40 PDU encoder/decoder                    |
//! | `modemlib-at`           | AT state machine, IO task, [`Modem`] handle      |
//! | **`modemlib`**          | This facade crate -- re-exports everything       |
//!
//! ## Events
//!
//! Unsolicited modem output (`RING`, `+CLIP`, `+CMTI`, `+CMT`) becomes
//! [`ModemEvent`]s on a broadcast channel. A slow subscriber lags and
//! misses events instead of stalling the modem.

pub use modemlib_core::*;

pub use modemlib_at::{Modem, ModemBuilder};

/// The AT engine: state machine, reassembly, and IO task.
pub mod at {
    pub use modemlib_at::*;
}

/// PDU encoding and decoding.
pub mod pdu {
    pub use modemlib_pdu::*;
}

/// Serial port and audio capture implementations.
pub mod transport {
    pub use modemlib_transport::*;
}
