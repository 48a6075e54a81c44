//! The [`PduCodec`] trait -- SMS PDU encode/decode capability.
//!
//! The AT engine never looks inside a PDU. It hands captured hex blobs to a
//! codec and receives [`PduFragment`]s back, and asks the codec to split an
//! outgoing text into [`PduSegment`]s. `modemlib-pdu` provides the GSM 03.40
//! implementation; tests substitute small table-driven codecs.

use crate::error::Result;
use crate::types::{PduFragment, PduSegment};

/// Encode and decode SMS PDUs in their hexadecimal modem representation.
pub trait PduCodec: Send + Sync + 'static {
    /// Decode one hexadecimal PDU (as printed after `+CMGR:` or `+CMT:`)
    /// into a fragment.
    ///
    /// Returns [`Error::Protocol`](crate::error::Error::Protocol) for
    /// malformed input.
    fn decode(&self, hex: &str) -> Result<PduFragment>;

    /// Encode `text` addressed to `address` into one or more SMS-SUBMIT
    /// PDUs, in sending order.
    fn encode(&self, text: &str, address: &str) -> Result<Vec<PduSegment>>;
}
