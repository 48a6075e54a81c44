//! Line framing and reply parsing for the AT command protocol.
//!
//! Modems answer AT commands with `\r\n`-delimited text lines and mix in
//! unsolicited result codes (`RING`, `+CMTI:`, `+CLIP:`) at any point. This
//! module turns the raw byte stream into lines and extracts the fields the
//! state machine needs from individual lines. It holds no session state.

/// Line delimiter.
pub const LINE_END: u8 = b'\n';

/// Maximum number of buffered bytes without a line delimiter before the
/// partial line is discarded.
pub const MAX_BUF: usize = 8192;

/// Splits a byte stream into text lines.
///
/// Lines are delimited by `\n`; a trailing `\r` is stripped. Bytes arrive
/// at arbitrary granularity and only complete lines are returned. Invalid
/// UTF-8 is replaced rather than rejected.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        LineFramer { buf: Vec::new() }
    }

    /// Append received bytes and return every line they complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == LINE_END) {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        // Bounded buffer: a line that never ends is noise on the wire.
        if self.buf.len() > MAX_BUF {
            tracing::warn!(len = self.buf.len(), "line buffer overflow, discarding partial line");
            self.buf.clear();
        }
        lines
    }

    /// Number of buffered bytes that do not yet form a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Discard any partial line.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Whether a line counts as blank for the `OK` completion rule.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Parse the storage index from `+CMTI: "SM",<id>`.
///
/// Only SIM storage is recognized.
///
/// ```
/// use modemlib_at::protocol::parse_cmti;
///
/// assert_eq!(parse_cmti("+CMTI: \"SM\",3"), Some(3));
/// assert_eq!(parse_cmti("+CMTI: \"ME\",3"), None);
/// ```
pub fn parse_cmti(line: &str) -> Option<u32> {
    leading_number(line.strip_prefix("+CMTI: \"SM\",")?)
}

/// Extract the number from `+CLIP: "<number>",...`.
///
/// Returns an empty string when the line has no quoted number.
pub fn parse_clip(line: &str) -> String {
    line.strip_prefix("+CLIP: \"")
        .and_then(|rest| rest.split_once('"'))
        .map(|(number, _)| number.to_string())
        .unwrap_or_default()
}

/// Parse the message reference from `+CMGS: <mr>`.
pub fn parse_cmgs(line: &str) -> Option<u32> {
    leading_number(line.strip_prefix("+CMGS: ")?)
}

/// Parse `+CSQ: <rssi>,<ber>`.
pub fn parse_csq(line: &str) -> Option<(u8, u8)> {
    let (rssi, ber) = line.strip_prefix("+CSQ:")?.split_once(',')?;
    Some((rssi.trim().parse().ok()?, ber.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framer_splits_and_strips_cr() {
        let mut f = LineFramer::new();
        assert_eq!(f.push(b"\r\nRING\r\n"), vec!["", "RING"]);
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn framer_holds_partial_lines() {
        let mut f = LineFramer::new();
        assert!(f.push(b"+CLIP: \"+1555").is_empty());
        assert_eq!(f.pending(), 13);
        assert_eq!(f.push(b"1234567\",145\r\nOK"), vec!["+CLIP: \"+15551234567\",145"]);
        assert_eq!(f.pending(), 2);
    }

    #[test]
    fn framer_byte_at_a_time() {
        let mut f = LineFramer::new();
        let mut lines = Vec::new();
        for b in b"SMS Ready\r\nCall Ready\r\n" {
            lines.extend(f.push(&[*b]));
        }
        assert_eq!(lines, vec!["SMS Ready", "Call Ready"]);
    }

    #[test]
    fn framer_keeps_bare_lf_lines() {
        let mut f = LineFramer::new();
        assert_eq!(f.push(b"OK\n\n"), vec!["OK", ""]);
    }

    #[test]
    fn framer_overflow_discards_partial() {
        let mut f = LineFramer::new();
        let noise = vec![b'x'; MAX_BUF + 1];
        assert!(f.push(&noise).is_empty());
        assert_eq!(f.pending(), 0);
        assert_eq!(f.push(b"OK\r\n"), vec!["OK"]);
    }

    #[test]
    fn framer_replaces_invalid_utf8() {
        let mut f = LineFramer::new();
        assert_eq!(f.push(b"A\xFFB\r\n"), vec!["A\u{FFFD}B"]);
    }

    #[test]
    fn blank_lines() {
        assert!(is_blank(""));
        assert!(is_blank("  "));
        assert!(!is_blank("OK"));
    }

    #[test]
    fn cmti_parsing() {
        assert_eq!(parse_cmti("+CMTI: \"SM\",12"), Some(12));
        assert_eq!(parse_cmti("+CMTI: \"SM\","), None);
        assert_eq!(parse_cmti("+CMTI: \"SM\",x"), None);
        assert_eq!(parse_cmti("RING"), None);
    }

    #[test]
    fn clip_parsing() {
        assert_eq!(parse_clip("+CLIP: \"+15551234567\",145,\"\",,\"\",0"), "+15551234567");
        assert_eq!(parse_clip("+CLIP: \"+15551234567\""), "+15551234567");
        assert_eq!(parse_clip("+CLIP: garbage"), "");
        assert_eq!(parse_clip("+CLIP: \"unterminated"), "");
        assert_eq!(parse_clip("+CLIP:"), "");
    }

    #[test]
    fn cmgs_parsing() {
        assert_eq!(parse_cmgs("+CMGS: 42"), Some(42));
        assert_eq!(parse_cmgs("+CMGS: 7,\"20/10/19\""), Some(7));
        assert_eq!(parse_cmgs("+CMGS: "), None);
        assert_eq!(parse_cmgs("+CMGS:42"), None);
    }

    #[test]
    fn csq_parsing() {
        assert_eq!(parse_csq("+CSQ: 21,0"), Some((21, 0)));
        assert_eq!(parse_csq("+CSQ: 99,99"), Some((99, 99)));
        assert_eq!(parse_csq("+CSQ: 21"), None);
        assert_eq!(parse_csq("+CSQ: a,b"), None);
    }
}
