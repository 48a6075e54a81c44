//! modemlib-pdu: SMS PDU codec for modemlib.
//!
//! Implements [`PduCodec`](modemlib_core::PduCodec) for GSM 03.40 PDUs as
//! exchanged with a modem in PDU mode (`AT+CMGF=0`):
//!
//! - decode SMS-DELIVER (incoming) and SMS-SUBMIT (stored outgoing) PDUs in
//!   the GSM 7-bit, 8-bit and UCS-2 alphabets, including concatenation
//!   headers and alphanumeric senders
//! - encode SMS-SUBMIT PDUs, choosing GSM 7-bit when the text allows it and
//!   UCS-2 otherwise, splitting long texts into numbered segments
//!
//! # Example
//!
//! ```
//! use modemlib_pdu::GsmPduCodec;
//! use modemlib_core::PduCodec;
//!
//! let codec = GsmPduCodec::new();
//! let segments = codec.encode("hello", "+15551234567").unwrap();
//! assert_eq!(segments.len(), 1);
//! assert_eq!(segments[0].tpdu_len, 19);
//!
//! let fragment = codec.decode(&segments[0].hex).unwrap();
//! assert_eq!(fragment.text, "hello");
//! ```

pub mod address;
pub mod codec;
pub mod error;
pub mod gsm7;

pub use codec::{Alphabet, GsmPduCodec, decode_pdu};
pub use error::PduError;
