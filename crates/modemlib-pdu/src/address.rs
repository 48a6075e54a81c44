//! TP-OA / TP-DA address fields.

use crate::error::PduError;
use crate::gsm7;

/// Type-of-address for an international number (TON 1, ISDN plan).
pub const TOA_INTERNATIONAL: u8 = 0x91;
/// Type-of-address for an unknown/national number (TON 0, ISDN plan).
pub const TOA_UNKNOWN: u8 = 0x81;

const TON_MASK: u8 = 0x70;
const TON_INTERNATIONAL: u8 = 0x10;
const TON_ALPHANUMERIC: u8 = 0x50;

fn semi_octet_value(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        '*' => Some(0x0A),
        '#' => Some(0x0B),
        _ => None,
    }
}

fn semi_octet_char(v: u8) -> Option<char> {
    match v {
        0..=9 => Some(char::from(b'0' + v)),
        0x0A => Some('*'),
        0x0B => Some('#'),
        0x0C => Some('a'),
        0x0D => Some('b'),
        0x0E => Some('c'),
        _ => None,
    }
}

/// Encode a phone number as an address field: digit count, type-of-address,
/// then swapped semi-octets padded with `F`.
///
/// A leading `+` selects the international type. Spaces are ignored.
pub fn encode(address: &str) -> Result<Vec<u8>, PduError> {
    let trimmed: String = address.chars().filter(|c| !c.is_whitespace()).collect();
    let (toa, digits) = match trimmed.strip_prefix('+') {
        Some(rest) => (TOA_INTERNATIONAL, rest),
        None => (TOA_UNKNOWN, trimmed.as_str()),
    };

    let values: Vec<u8> = digits
        .chars()
        .map(semi_octet_value)
        .collect::<Option<_>>()
        .ok_or_else(|| PduError::InvalidAddress(address.to_string()))?;
    if values.is_empty() || values.len() > 20 {
        return Err(PduError::InvalidAddress(address.to_string()));
    }

    let mut out = Vec::with_capacity(2 + values.len().div_ceil(2));
    out.push(values.len() as u8);
    out.push(toa);
    for pair in values.chunks(2) {
        let lo = pair[0];
        let hi = pair.get(1).copied().unwrap_or(0x0F);
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

/// Decode the address at the start of `data`.
///
/// Returns the address text and the number of octets consumed.
/// International numbers get a leading `+`; alphanumeric senders are
/// decoded from packed GSM 7-bit.
pub fn decode(data: &[u8]) -> Result<(String, usize), PduError> {
    let (&len, rest) = data.split_first().ok_or(PduError::Truncated("address length"))?;
    let (&toa, rest) = rest.split_first().ok_or(PduError::Truncated("address type"))?;
    let octets = usize::from(len).div_ceil(2);
    let body = rest.get(..octets).ok_or(PduError::Truncated("address"))?;

    let text = match toa & TON_MASK {
        TON_ALPHANUMERIC => {
            let chars = usize::from(len) * 4 / 7;
            gsm7::septets_to_text(&gsm7::unpack(body, 0, chars))
        }
        ton => {
            let mut s = String::with_capacity(usize::from(len) + 1);
            if ton == TON_INTERNATIONAL {
                s.push('+');
            }
            for &b in body {
                for v in [b & 0x0F, b >> 4] {
                    if let Some(c) = semi_octet_char(v) {
                        s.push(c);
                    }
                }
            }
            s
        }
    };
    Ok((text, 2 + octets))
}
