//! Core types used throughout modemlib.
//!
//! These describe decoded SMS units, reassembled messages, outgoing PDU
//! segments, and small status snapshots. They carry no I/O and no protocol
//! state; the AT engine in `modemlib-at` produces and consumes them.

use std::fmt;

/// Concatenation information carried in the user data header of one
/// fragment of a multipart SMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MultipartHeader {
    /// Reference number shared by every fragment of the same message.
    pub reference: u16,
    /// Total number of fragments the message was split into.
    pub total_parts: u8,
    /// 1-based index of this fragment.
    pub part_index: u8,
}

/// One decoded SMS unit, as produced by a [`PduCodec`](crate::codec::PduCodec).
///
/// A fragment without a [`MultipartHeader`] is a complete message on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduFragment {
    /// Originating address (or destination, for stored outgoing messages).
    pub sender: String,
    /// Decoded text of this fragment.
    pub text: String,
    /// Concatenation header, present only on multipart fragments.
    pub multipart: Option<MultipartHeader>,
}

impl PduFragment {
    /// Create a single-part fragment.
    pub fn single(sender: impl Into<String>, text: impl Into<String>) -> Self {
        PduFragment {
            sender: sender.into(),
            text: text.into(),
            multipart: None,
        }
    }

    /// Create one fragment of a multipart message.
    pub fn part(
        sender: impl Into<String>,
        text: impl Into<String>,
        reference: u16,
        total_parts: u8,
        part_index: u8,
    ) -> Self {
        PduFragment {
            sender: sender.into(),
            text: text.into(),
            multipart: Some(MultipartHeader {
                reference,
                total_parts,
                part_index,
            }),
        }
    }
}

/// A complete SMS delivered to the application.
///
/// Produced either directly from a single-part fragment or by the
/// reassembler once every part of a multipart message has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Originating address.
    pub sender: String,
    /// Full message text.
    pub text: String,
}

impl fmt::Display for AssembledMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.text)
    }
}

/// One encoded SMS-SUBMIT PDU ready to be written after `AT+CMGS=<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSegment {
    /// Upper-case hexadecimal PDU, including the leading SMSC field.
    pub hex: String,
    /// Length in octets of the TPDU (the PDU without the SMSC field), which
    /// is the value `AT+CMGS=` expects.
    pub tpdu_len: usize,
}

/// Readiness flags reported by the modem after power-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModemStatus {
    /// The modem printed `SMS Ready`.
    pub sms_ready: bool,
    /// The modem printed `Call Ready`.
    pub call_ready: bool,
}

/// Received signal quality as reported by `+CSQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    /// RSSI index 0..=31, or 99 when unknown.
    pub rssi: u8,
    /// Channel bit error rate index 0..=7, or 99 when unknown.
    pub ber: u8,
}

impl SignalQuality {
    /// Approximate received power in dBm, or `None` when the modem reports
    /// the value as unknown.
    pub fn dbm(&self) -> Option<i32> {
        match self.rssi {
            0..=31 => Some(-113 + 2 * self.rssi as i32),
            _ => None,
        }
    }
}
