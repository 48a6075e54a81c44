//! GSM 03.40 SMS-DELIVER / SMS-SUBMIT codec.
//!
//! # Layout
//!
//! ```text
//! SMSC | FO | [MR] | OA/DA | PID | DCS | SCTS/VP | UDL | UD
//! ```
//!
//! - `SMSC`: length-prefixed service centre address, `00` when omitted
//! - `FO`: first octet; MTI in bits 0-1, VPF in bits 3-4, SRR bit 5, UDHI bit 6
//! - `MR`: message reference, SMS-SUBMIT only
//! - `SCTS`: 7-octet timestamp on SMS-DELIVER; SMS-SUBMIT carries a
//!   validity period sized by VPF instead
//! - `UDL`: user data length in septets (7-bit) or octets (8-bit, UCS-2)
//! - `UD`: optional user data header, then the text
//!
//! Outgoing messages longer than one PDU are split and numbered with the
//! 8-bit-reference concatenation element (IEI `0x00`). Both the 8-bit and
//! 16-bit (IEI `0x08`) forms are understood on decode.

use std::fmt::Write as _;

use modemlib_core::codec::PduCodec;
use modemlib_core::types::{MultipartHeader, PduFragment, PduSegment};

use crate::address;
use crate::error::PduError;
use crate::gsm7;

const MTI_DELIVER: u8 = 0x00;
const MTI_SUBMIT: u8 = 0x01;

const FO_VPF_RELATIVE: u8 = 0x10;
const FO_SRR: u8 = 0x20;
const FO_UDHI: u8 = 0x40;

const DCS_GSM7: u8 = 0x00;
const DCS_UCS2: u8 = 0x08;

/// Relative validity period of 24 hours.
const VP_ONE_DAY: u8 = 0xA7;

const IEI_CONCAT_8: u8 = 0x00;
const IEI_CONCAT_16: u8 = 0x08;

/// Septets in a single-part 7-bit message.
pub const GSM7_SINGLE_CAPACITY: usize = 160;
/// Septets per part of a concatenated 7-bit message.
pub const GSM7_PART_CAPACITY: usize = 153;
/// UTF-16 code units in a single-part UCS-2 message.
pub const UCS2_SINGLE_CAPACITY: usize = 70;
/// UTF-16 code units per part of a concatenated UCS-2 message.
pub const UCS2_PART_CAPACITY: usize = 67;

/// Character set of the user data, derived from the DCS octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    /// GSM 03.38 default alphabet, packed septets.
    Gsm7,
    /// Raw octets.
    EightBit,
    /// UTF-16 big-endian.
    Ucs2,
}

impl Alphabet {
    /// Interpret a data coding scheme octet.
    ///
    /// Reserved values fall back to the default alphabet.
    pub fn from_dcs(dcs: u8) -> Self {
        match dcs >> 4 {
            // General data coding and automatic deletion groups.
            0x0..=0x7 => match (dcs >> 2) & 0x03 {
                0x01 => Alphabet::EightBit,
                0x02 => Alphabet::Ucs2,
                _ => Alphabet::Gsm7,
            },
            // Message waiting indication, UCS-2 variant.
            0xE => Alphabet::Ucs2,
            // Data coding / message class.
            0xF if dcs & 0x04 != 0 => Alphabet::EightBit,
            _ => Alphabet::Gsm7,
        }
    }
}

/// GSM 03.40 PDU codec.
///
/// Encodes SMS-SUBMIT PDUs with an empty SMSC field (the modem's stored
/// service centre is used), a 24-hour relative validity period, and by
/// default a status report request.
#[derive(Debug, Clone)]
pub struct GsmPduCodec {
    status_report: bool,
}

impl Default for GsmPduCodec {
    fn default() -> Self {
        GsmPduCodec::new()
    }
}

impl GsmPduCodec {
    /// Create a codec that requests status reports.
    pub fn new() -> Self {
        GsmPduCodec {
            status_report: true,
        }
    }

    /// Set whether outgoing PDUs request a status report.
    pub fn with_status_report(mut self, enabled: bool) -> Self {
        self.status_report = enabled;
        self
    }

    /// Encode `text` for `address` using a caller-chosen concatenation
    /// reference. The reference is only written when the text needs more
    /// than one segment.
    pub fn encode_with_reference(
        &self,
        text: &str,
        address: &str,
        reference: u8,
    ) -> Result<Vec<PduSegment>, PduError> {
        let destination = address::encode(address)?;
        let alphabet = if gsm7::is_encodable(text) {
            Alphabet::Gsm7
        } else {
            Alphabet::Ucs2
        };
        let parts = split(text, alphabet);
        if parts.len() > usize::from(u8::MAX) {
            return Err(PduError::TooManySegments(parts.len()));
        }

        let total = parts.len() as u8;
        let segments = parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                let header = (total > 1)
                    .then(|| [0x05, IEI_CONCAT_8, 0x03, reference, total, i as u8 + 1]);
                self.build_submit(&destination, alphabet, part, header.as_ref().map(|h| &h[..]))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            address,
            ?alphabet,
            segments = segments.len(),
            "encoded SMS-SUBMIT"
        );
        Ok(segments)
    }

    fn build_submit(
        &self,
        destination: &[u8],
        alphabet: Alphabet,
        text: &str,
        header: Option<&[u8]>,
    ) -> Result<PduSegment, PduError> {
        let mut fo = MTI_SUBMIT | FO_VPF_RELATIVE;
        if self.status_report {
            fo |= FO_SRR;
        }
        if header.is_some() {
            fo |= FO_UDHI;
        }

        let (dcs, udl, ud) = match alphabet {
            Alphabet::Gsm7 => {
                let septets = gsm7::to_septets(text)
                    .ok_or_else(|| PduError::Unencodable(text.to_string()))?;
                let start = header.map_or(0, |h| gsm7::header_septets(h.len()));
                let mut ud = gsm7::pack(&septets, start);
                if let Some(h) = header {
                    ud[..h.len()].copy_from_slice(h);
                }
                (DCS_GSM7, start + septets.len(), ud)
            }
            Alphabet::Ucs2 | Alphabet::EightBit => {
                let mut ud = header.map(<[u8]>::to_vec).unwrap_or_default();
                for unit in text.encode_utf16() {
                    ud.extend_from_slice(&unit.to_be_bytes());
                }
                (DCS_UCS2, ud.len(), ud)
            }
        };

        // SMSC, FO, MR
        let mut pdu = vec![0x00, fo, 0x00];
        pdu.extend_from_slice(destination);
        pdu.extend_from_slice(&[0x00, dcs, VP_ONE_DAY, udl as u8]);
        pdu.extend_from_slice(&ud);

        Ok(PduSegment {
            hex: to_hex(&pdu),
            tpdu_len: pdu.len() - 1,
        })
    }
}

impl PduCodec for GsmPduCodec {
    fn decode(&self, hex: &str) -> modemlib_core::Result<PduFragment> {
        Ok(decode_pdu(hex)?)
    }

    fn encode(&self, text: &str, address: &str) -> modemlib_core::Result<Vec<PduSegment>> {
        Ok(self.encode_with_reference(text, address, rand::random())?)
    }
}

/// Split text into parts that each fit one PDU.
fn split(text: &str, alphabet: Alphabet) -> Vec<String> {
    fn septets(c: char) -> usize {
        gsm7::septet_len(c).unwrap_or(1)
    }
    fn utf16_units(c: char) -> usize {
        c.len_utf16()
    }

    let (single, part, cost) = match alphabet {
        Alphabet::Gsm7 => (
            GSM7_SINGLE_CAPACITY,
            GSM7_PART_CAPACITY,
            septets as fn(char) -> usize,
        ),
        Alphabet::Ucs2 | Alphabet::EightBit => (
            UCS2_SINGLE_CAPACITY,
            UCS2_PART_CAPACITY,
            utf16_units as fn(char) -> usize,
        ),
    };

    if text.chars().map(cost).sum::<usize>() <= single {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for c in text.chars() {
        let n = cost(c);
        if used + n > part {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += n;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Decode one hexadecimal SMS-DELIVER or SMS-SUBMIT PDU.
pub fn decode_pdu(hex: &str) -> Result<PduFragment, PduError> {
    let data = from_hex(hex)?;
    let mut r = Reader::new(&data);

    let smsc_len = r.u8("SMSC length")?;
    r.take(usize::from(smsc_len), "SMSC")?;

    let fo = r.u8("first octet")?;
    let mti = fo & 0x03;
    if mti != MTI_DELIVER && mti != MTI_SUBMIT {
        return Err(PduError::UnsupportedMessageType(mti));
    }
    if mti == MTI_SUBMIT {
        r.u8("message reference")?;
    }

    let (sender, consumed) = address::decode(r.rest())?;
    r.take(consumed, "address")?;

    let _pid = r.u8("protocol identifier")?;
    let dcs = r.u8("data coding scheme")?;

    if mti == MTI_DELIVER {
        r.take(7, "timestamp")?;
    } else {
        let vp_len = match (fo >> 3) & 0x03 {
            0x00 => 0,
            0x02 => 1,
            _ => 7,
        };
        r.take(vp_len, "validity period")?;
    }

    let udl = usize::from(r.u8("user data length")?);
    let ud = r.rest();
    let alphabet = Alphabet::from_dcs(dcs);

    let mut header_octets = 0;
    let mut multipart = None;
    if fo & FO_UDHI != 0 {
        let udhl = usize::from(*ud.first().ok_or(PduError::Truncated("user data header"))?);
        let header = ud.get(1..=udhl).ok_or(PduError::Truncated("user data header"))?;
        multipart = parse_concat(header);
        header_octets = udhl + 1;
    }

    let text = match alphabet {
        Alphabet::Gsm7 => {
            if ud.len() < (udl * 7).div_ceil(8) {
                return Err(PduError::Truncated("user data"));
            }
            let start = if header_octets > 0 {
                gsm7::header_septets(header_octets)
            } else {
                0
            };
            gsm7::septets_to_text(&gsm7::unpack(ud, start, udl))
        }
        Alphabet::Ucs2 | Alphabet::EightBit => {
            let body = ud
                .get(header_octets..udl)
                .ok_or(PduError::Truncated("user data"))?;
            if alphabet == Alphabet::Ucs2 {
                let units: Vec<u16> = body
                    .chunks_exact(2)
                    .map(|p| u16::from_be_bytes([p[0], p[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            } else {
                body.iter().map(|&b| char::from(b)).collect()
            }
        }
    };

    tracing::trace!(%sender, ?alphabet, ?multipart, "decoded PDU");
    Ok(PduFragment {
        sender,
        text,
        multipart,
    })
}

/// Find a concatenation element in a user data header.
fn parse_concat(mut header: &[u8]) -> Option<MultipartHeader> {
    let mut found = None;
    while let [iei, len, rest @ ..] = header {
        let len = usize::from(*len);
        let Some(value) = rest.get(..len) else {
            break;
        };
        let parsed = match (*iei, value) {
            (IEI_CONCAT_8, &[reference, total, index]) => Some((u16::from(reference), total, index)),
            (IEI_CONCAT_16, &[hi, lo, total, index]) => {
                Some((u16::from_be_bytes([hi, lo]), total, index))
            }
            _ => None,
        };
        if let Some((reference, total_parts, part_index)) = parsed {
            if total_parts == 0 || part_index == 0 || part_index > total_parts {
                tracing::debug!(reference, total_parts, part_index, "ignoring invalid concatenation element");
            } else {
                found = Some(MultipartHeader {
                    reference,
                    total_parts,
                    part_index,
                });
            }
        }
        header = &rest[len..];
    }
    found
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, PduError> {
        let b = *self.data.get(self.pos).ok_or(PduError::Truncated(field))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], PduError> {
        let slice = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or(PduError::Truncated(field))?;
        self.pos += n;
        Ok(slice)
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}

/// Upper-case hex encoding.
pub fn to_hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for b in data {
        let _ = write!(s, "{b:02X}");
    }
    s
}

/// Parse a hex string, ignoring surrounding whitespace.
pub fn from_hex(hex: &str) -> Result<Vec<u8>, PduError> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(PduError::InvalidHex(hex.to_string()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| PduError::InvalidHex(hex.to_string()))
        })
        .collect()
}
