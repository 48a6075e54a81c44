//! Multipart SMS reassembly.
//!
//! Long messages arrive as several PDUs that share a concatenation
//! reference. [`Reassembler`] buffers fragments per reference until every
//! index `1..=total` is present, then joins the texts in index order.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use modemlib_core::codec::PduCodec;
use modemlib_core::error::{Error, Result};
use modemlib_core::types::{AssembledMessage, PduFragment};

/// Result of offering one fragment to the [`Reassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// The message is complete. `reference` is set when it was assembled
    /// from a multipart group.
    Complete {
        message: AssembledMessage,
        reference: Option<u16>,
    },
    /// The fragment was buffered; other parts of `reference` are missing.
    Incomplete { reference: u16 },
}

#[derive(Debug)]
struct Group {
    fragments: BTreeMap<u8, PduFragment>,
    started: Instant,
}

/// Buffers multipart fragments keyed by concatenation reference.
#[derive(Debug, Default)]
pub struct Reassembler {
    groups: HashMap<u16, Group>,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler::default()
    }

    /// Offer a decoded fragment.
    ///
    /// A fragment without a multipart header completes immediately and does
    /// not touch the buffer. A fragment repeating an index already held for
    /// its reference replaces the stored one. A header whose index lies
    /// outside `1..=total` cannot be placed and is treated as no header.
    pub fn accept(&mut self, fragment: PduFragment) -> Assembly {
        let header = fragment
            .multipart
            .filter(|h| (1..=h.total_parts).contains(&h.part_index));
        if header.is_none() && fragment.multipart.is_some() {
            tracing::debug!(header = ?fragment.multipart, "unusable multipart header, delivering as single");
        }
        let Some(header) = header else {
            return Assembly::Complete {
                message: AssembledMessage {
                    sender: fragment.sender,
                    text: fragment.text,
                },
                reference: None,
            };
        };

        let reference = header.reference;
        let group = &mut self
            .groups
            .entry(reference)
            .or_insert_with(|| Group {
                fragments: BTreeMap::new(),
                started: Instant::now(),
            })
            .fragments;
        if group.insert(header.part_index, fragment).is_some() {
            tracing::debug!(reference, part = header.part_index, "duplicate fragment replaced");
        }

        let complete = (1..=header.total_parts).all(|i| group.contains_key(&i));
        if !complete {
            tracing::debug!(
                reference,
                have = group.len(),
                total = header.total_parts,
                "multipart SMS incomplete"
            );
            return Assembly::Incomplete { reference };
        }

        let Some(group) = self.groups.remove(&reference) else {
            return Assembly::Incomplete { reference };
        };
        let mut parts = group
            .fragments
            .into_iter()
            .filter(|(i, _)| *i <= header.total_parts)
            .map(|(_, f)| f);
        let first = parts.next();
        let sender = first.as_ref().map(|f| f.sender.clone()).unwrap_or_default();
        let text: String = first.into_iter().chain(parts).map(|f| f.text).collect();

        tracing::debug!(reference, total = header.total_parts, "multipart SMS reassembled");
        Assembly::Complete {
            message: AssembledMessage { sender, text },
            reference: Some(reference),
        }
    }

    /// Number of fragments buffered for `reference`.
    pub fn pending(&self, reference: u16) -> usize {
        self.groups.get(&reference).map_or(0, |g| g.fragments.len())
    }

    /// Drop groups whose first fragment arrived more than `max_age` before
    /// `now`. Returns the evicted references.
    pub fn evict_older_than(&mut self, max_age: Duration, now: Instant) -> Vec<u16> {
        let mut evicted = Vec::new();
        self.groups.retain(|reference, group| {
            let keep = now.saturating_duration_since(group.started) <= max_age;
            if !keep {
                tracing::warn!(
                    reference,
                    have = group.fragments.len(),
                    "multipart SMS never completed, dropping fragments"
                );
                evicted.push(*reference);
            }
            keep
        });
        evicted
    }

    /// Number of incomplete multipart groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Find the PDU line in captured `+CMGR` / `+CMT` output.
///
/// The PDU is the first non-blank line after the header line and must be
/// hexadecimal.
pub fn extract_pdu(captured: &str) -> Option<&str> {
    let mut lines = captured.lines().map(str::trim);
    lines.find(|l| l.starts_with("+CMGR:") || l.starts_with("+CMT:"))?;
    let pdu = lines.find(|l| !l.is_empty())?;
    pdu.bytes().all(|b| b.is_ascii_hexdigit()).then_some(pdu)
}

/// Extract and decode the PDU from captured output, with NUL characters
/// removed from the text.
pub fn decode_capture(codec: &dyn PduCodec, captured: &str) -> Result<PduFragment> {
    let pdu = extract_pdu(captured)
        .ok_or_else(|| Error::Protocol(format!("no PDU in captured reply {captured:?}")))?;
    let mut fragment = codec.decode(pdu)?;
    fragment.text.retain(|c| c != '\0');
    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modemlib_pdu::GsmPduCodec;

    fn part(text: &str, reference: u16, total: u8, index: u8) -> PduFragment {
        PduFragment::part("+15551234567", text, reference, total, index)
    }

    fn complete(text: &str, reference: Option<u16>) -> Assembly {
        Assembly::Complete {
            message: AssembledMessage {
                sender: "+15551234567".into(),
                text: text.into(),
            },
            reference,
        }
    }

    #[test]
    fn single_part_returns_immediately() {
        let mut r = Reassembler::new();
        let out = r.accept(PduFragment::single("+15551234567", "hi"));
        assert_eq!(out, complete("hi", None));
        assert!(r.is_empty());
    }

    #[test]
    fn single_part_does_not_touch_pending_groups() {
        let mut r = Reassembler::new();
        r.accept(part("a", 9, 2, 1));
        r.accept(PduFragment::single("+15551234567", "hi"));
        assert_eq!(r.pending(9), 1);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn in_order_parts_reassemble() {
        let mut r = Reassembler::new();
        assert_eq!(r.accept(part("one ", 1, 3, 1)), Assembly::Incomplete { reference: 1 });
        assert_eq!(r.accept(part("two ", 1, 3, 2)), Assembly::Incomplete { reference: 1 });
        assert_eq!(r.accept(part("three", 1, 3, 3)), complete("one two three", Some(1)));
        assert!(r.is_empty());
    }

    #[test]
    fn out_of_order_parts_join_by_index() {
        let mut r = Reassembler::new();
        r.accept(part("C", 5, 3, 3));
        r.accept(part("A", 5, 3, 1));
        assert_eq!(r.accept(part("B", 5, 3, 2)), complete("ABC", Some(5)));
        assert_eq!(r.pending(5), 0);
    }

    #[test]
    fn missing_index_retains_all_fragments() {
        let mut r = Reassembler::new();
        r.accept(part("A", 7, 3, 1));
        assert_eq!(r.accept(part("C", 7, 3, 3)), Assembly::Incomplete { reference: 7 });
        assert_eq!(r.pending(7), 2);
    }

    #[test]
    fn duplicate_index_replaces() {
        let mut r = Reassembler::new();
        r.accept(part("old", 3, 2, 1));
        r.accept(part("new", 3, 2, 1));
        assert_eq!(r.pending(3), 1);
        assert_eq!(r.accept(part("!", 3, 2, 2)), complete("new!", Some(3)));
    }

    #[test]
    fn references_are_independent() {
        let mut r = Reassembler::new();
        r.accept(part("x1", 1, 2, 1));
        r.accept(part("y1", 2, 2, 1));
        assert_eq!(r.accept(part("y2", 2, 2, 2)), complete("y1y2", Some(2)));
        assert_eq!(r.pending(1), 1);
    }

    #[test]
    fn zero_total_is_delivered_as_single() {
        let mut r = Reassembler::new();
        let out = r.accept(part("lost text", 9, 0, 1));
        assert_eq!(out, complete("lost text", None));
        assert!(r.is_empty());
    }

    #[test]
    fn index_outside_total_is_delivered_as_single() {
        let mut r = Reassembler::new();
        r.accept(part("A", 4, 2, 1));
        assert_eq!(r.accept(part("zero", 4, 2, 0)), complete("zero", None));
        assert_eq!(r.accept(part("three", 4, 2, 3)), complete("three", None));
        assert_eq!(r.pending(4), 1);
    }

    #[test]
    fn stale_groups_are_evicted() {
        let mut r = Reassembler::new();
        r.accept(part("A", 1, 2, 1));
        r.accept(part("B", 2, 2, 1));

        let soon = Instant::now() + Duration::from_secs(1);
        assert!(r.evict_older_than(Duration::from_secs(60), soon).is_empty());
        assert_eq!(r.len(), 2);

        let later = Instant::now() + Duration::from_secs(120);
        let mut evicted = r.evict_older_than(Duration::from_secs(60), later);
        evicted.sort();
        assert_eq!(evicted, vec![1, 2]);
        assert!(r.is_empty());
    }

    #[test]
    fn extract_pdu_after_cmgr_header() {
        let captured = "+CMGR: 0,,24\n07911326040000F0040B911346610089F6";
        assert_eq!(extract_pdu(captured), Some("07911326040000F0040B911346610089F6"));
    }

    #[test]
    fn extract_pdu_after_cmt_header_skips_blanks() {
        let captured = "+CMT: ,24\n\n00040B915155214365F7";
        assert_eq!(extract_pdu(captured), Some("00040B915155214365F7"));
    }

    #[test]
    fn extract_pdu_rejects_non_hex_and_missing() {
        assert_eq!(extract_pdu("+CMGR: 0,,24\nhello there"), None);
        assert_eq!(extract_pdu("+CMGR: 0,,24"), None);
        assert_eq!(extract_pdu("0011"), None);
    }

    #[test]
    fn decode_capture_strips_nul() {
        let codec = GsmPduCodec::new();
        let captured = "+CMGR: 0,,22\n00040B915155214365F700045210726104104003414200";
        let fragment = decode_capture(&codec, captured).unwrap();
        assert_eq!(fragment.text, "AB");
        assert_eq!(fragment.sender, "+15551234567");
    }

    #[test]
    fn decode_capture_reports_protocol_error() {
        let codec = GsmPduCodec::new();
        let err = decode_capture(&codec, "+CMGR: 0,,24\nZZ").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        let err = decode_capture(&codec, "+CMGR: 0,,24\n0002").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
