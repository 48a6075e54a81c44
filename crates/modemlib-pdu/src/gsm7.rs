//! GSM 03.38 default alphabet and septet packing.
//!
//! Text in the default alphabet is carried as 7-bit septets packed
//! little-endian into octets. Characters from the extension table take two
//! septets: [`ESCAPE`] followed by the extension code.

/// Escape to the extension table.
pub const ESCAPE: u8 = 0x1B;

/// The basic character set, indexed by septet value. Position 0x1B is the
/// escape code and never decodes to a character.
const BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞ\u{1b}ÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// Extension table: (code after escape, character).
const EXTENSION: &[(u8, char)] = &[
    (0x0A, '\u{0C}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

fn basic_code(c: char) -> Option<u8> {
    if c == '\u{1b}' {
        return None;
    }
    BASIC.chars().position(|b| b == c).map(|p| p as u8)
}

fn extension_code(c: char) -> Option<u8> {
    EXTENSION.iter().find(|(_, e)| *e == c).map(|(code, _)| *code)
}

/// Number of septets `c` occupies, or `None` if it is not representable.
pub fn septet_len(c: char) -> Option<usize> {
    if basic_code(c).is_some() {
        Some(1)
    } else if extension_code(c).is_some() {
        Some(2)
    } else {
        None
    }
}

/// Whether every character of `text` is representable in the default
/// alphabet.
pub fn is_encodable(text: &str) -> bool {
    text.chars().all(|c| septet_len(c).is_some())
}

/// Convert text to septet codes. Returns `None` if any character is not
/// representable.
pub fn to_septets(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        if let Some(code) = basic_code(c) {
            out.push(code);
        } else {
            out.push(ESCAPE);
            out.push(extension_code(c)?);
        }
    }
    Some(out)
}

/// Convert septet codes to text.
///
/// An unknown extension code decodes as a space. A trailing escape is
/// dropped.
pub fn septets_to_text(septets: &[u8]) -> String {
    let mut out = String::with_capacity(septets.len());
    let mut escaped = false;
    for &s in septets {
        if escaped {
            let c = EXTENSION
                .iter()
                .find(|(code, _)| *code == s)
                .map(|(_, c)| *c)
                .unwrap_or(' ');
            out.push(c);
            escaped = false;
        } else if s == ESCAPE {
            escaped = true;
        } else if let Some(c) = BASIC.chars().nth(usize::from(s & 0x7F)) {
            out.push(c);
        }
    }
    out
}

/// Pack septets into octets, starting at septet position `start`.
///
/// The first `start` septets of the output are left zero so that a user
/// data header can be written over them. The result is exactly as long as
/// needed to hold `start + septets.len()` septets.
pub fn pack(septets: &[u8], start: usize) -> Vec<u8> {
    let total_bits = (start + septets.len()) * 7;
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    for (i, &s) in septets.iter().enumerate() {
        let bit = (start + i) * 7;
        let byte = bit / 8;
        let shift = bit % 8;
        let value = u16::from(s & 0x7F) << shift;
        out[byte] |= value as u8;
        if shift > 1 {
            out[byte + 1] |= (value >> 8) as u8;
        }
    }
    out
}

/// Unpack septets `start..count` from packed user data.
///
/// Missing trailing octets read as zero bits.
pub fn unpack(data: &[u8], start: usize, count: usize) -> Vec<u8> {
    (start..count)
        .map(|i| {
            let bit = i * 7;
            let byte = bit / 8;
            let shift = bit % 8;
            let lo = data.get(byte).copied().unwrap_or(0);
            let mut v = u16::from(lo) >> shift;
            if shift > 1 {
                let hi = data.get(byte + 1).copied().unwrap_or(0);
                v |= u16::from(hi) << (8 - shift);
            }
            (v & 0x7F) as u8
        })
        .collect()
}

/// Septet position at which text starts after a user data header of
/// `header_octets` octets (including the length octet), rounding up to the
/// next septet boundary.
pub fn header_septets(header_octets: usize) -> usize {
    (header_octets * 8).div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_table_is_complete() {
        assert_eq!(BASIC.chars().count(), 128);
        assert_eq!(basic_code('@'), Some(0x00));
        assert_eq!(basic_code('$'), Some(0x02));
        assert_eq!(basic_code('¤'), Some(0x24));
        assert_eq!(basic_code('A'), Some(0x41));
        assert_eq!(basic_code('à'), Some(0x7F));
    }

    #[test]
    fn extension_characters_take_two_septets() {
        assert_eq!(septet_len('a'), Some(1));
        assert_eq!(septet_len('€'), Some(2));
        assert_eq!(septet_len('Ж'), None);
        assert_eq!(to_septets("[a]").unwrap(), vec![0x1B, 0x3C, 0x61, 0x1B, 0x3E]);
    }

    #[test]
    fn escape_character_is_not_encodable() {
        assert!(!is_encodable("\u{1b}"));
        assert!(is_encodable("Hello {world}"));
    }

    #[test]
    fn pack_hello() {
        let septets = to_septets("hello").unwrap();
        assert_eq!(pack(&septets, 0), vec![0xE8, 0x32, 0x9B, 0xFD, 0x06]);
    }

    #[test]
    fn unpack_hello() {
        let data = [0xE8, 0x32, 0x9B, 0xFD, 0x06];
        assert_eq!(septets_to_text(&unpack(&data, 0, 5)), "hello");
    }

    #[test]
    fn pack_after_header_leaves_room() {
        // A 6-octet concatenation header occupies 7 septets.
        assert_eq!(header_septets(6), 7);
        let septets = to_septets("abc").unwrap();
        let packed = pack(&septets, 7);
        assert_eq!(packed.len(), 9);
        assert_eq!(&packed[..6], &[0, 0, 0, 0, 0, 0]);
        assert_eq!(&packed[6..], &[0xC2, 0xE2, 0x31]);
    }

    #[test]
    fn unknown_extension_decodes_as_space() {
        assert_eq!(septets_to_text(&[0x41, 0x1B, 0x00, 0x42]), "A B");
    }
}
