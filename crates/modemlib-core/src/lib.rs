//! modemlib-core: Core traits, types, and error definitions for modemlib.
//!
//! This crate defines the device-agnostic abstractions shared by the AT
//! engine, the transports, and the PDU codec. Applications depend on these
//! types without pulling in a serial stack.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`PduCodec`] -- SMS PDU encode/decode capability
//! - [`AudioCapture`] -- external audio capture process handle
//! - [`ModemEvent`] -- asynchronous notifications from the modem
//! - [`Error`] / [`Result`] -- error handling

pub mod audio;
pub mod codec;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use modemlib_core::*`.
pub use audio::{AudioCapture, ByteStream, CaptureConfig, SampleFormat};
pub use codec::PduCodec;
pub use error::{Error, Result};
pub use events::{ErrorKind, ModemEvent};
pub use transport::Transport;
pub use types::*;
