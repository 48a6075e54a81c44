//! The line-driven protocol state machine.
//!
//! [`ModemSession`] consumes modem output one line at a time and turns it
//! into [`Effect`]s for the IO task to carry out. It performs no I/O of its
//! own, so every protocol decision can be tested synchronously.
//!
//! # Per-line algorithm
//!
//! 1. Publish the raw line.
//! 2. If an SMS reply is being captured, append the line and hand the
//!    capture to its bound continuation, then leave capture mode.
//! 3. Otherwise dispatch through [`RECOGNIZERS`]: the first entry whose
//!    predicate matches handles the line; unmatched lines are dropped.
//! 4. A line starting with `OK` right after a blank line completes the
//!    current command, flushing any capture still open.
//! 5. Remember whether this line was blank.

use std::sync::Arc;
use std::time::{Duration, Instant};

use modemlib_core::codec::PduCodec;
use modemlib_core::events::ModemEvent;
use modemlib_core::types::{AssembledMessage, ModemStatus, SignalQuality};

use crate::protocol;
use crate::reassembly::{self, Assembly, Reassembler};

/// What to do with a captured SMS reply once it is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The reply answers `AT+CMGR=<id>`, issued by a read operation.
    AwaitingSmsRead { id: u32 },
    /// The reply was pushed by the modem (`+CMT`) or has no reader; a
    /// completed message is published as an event.
    AwaitingSmsNotify,
}

/// An action requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Broadcast an event to subscribers.
    Publish(ModemEvent),
    /// Read the stored message at this index (from `+CMTI`).
    ReadStored(u32),
    /// A capture produced a complete message.
    SmsResolved {
        continuation: Continuation,
        message: AssembledMessage,
        reference: Option<u16>,
    },
    /// A capture produced one fragment of a message still incomplete.
    SmsIncomplete {
        continuation: Continuation,
        reference: u16,
    },
    /// A capture could not be decoded.
    CaptureFailed {
        continuation: Continuation,
        error: String,
    },
}

/// One entry of the dispatch table.
pub struct Recognizer {
    /// Name used in trace output.
    pub name: &'static str,
    /// Whether this entry handles the line.
    pub matches: fn(&str) -> bool,
    /// Handle a matching line.
    pub handle: fn(&mut ModemSession, &str, &mut Vec<Effect>),
}

/// Line dispatch table, in priority order.
pub const RECOGNIZERS: &[Recognizer] = &[
    Recognizer {
        name: "sms-ready",
        matches: |l| l == "SMS Ready",
        handle: |s, _, fx| {
            if !s.sms_ready {
                s.sms_ready = true;
                fx.push(Effect::Publish(ModemEvent::SmsReady));
            }
        },
    },
    Recognizer {
        name: "call-ready",
        matches: |l| l == "Call Ready",
        handle: |s, _, fx| {
            if !s.call_ready {
                s.call_ready = true;
                fx.push(Effect::Publish(ModemEvent::CallReady));
            }
        },
    },
    Recognizer {
        name: "cmti",
        matches: |l| protocol::parse_cmti(l).is_some(),
        handle: |_, l, fx| {
            if let Some(id) = protocol::parse_cmti(l) {
                fx.push(Effect::ReadStored(id));
            }
        },
    },
    Recognizer {
        name: "cmgr",
        matches: |l| l.starts_with("+CMGR: "),
        handle: |s, l, _| {
            let continuation = s
                .awaiting_read
                .take()
                .unwrap_or(Continuation::AwaitingSmsNotify);
            s.begin_capture(l, continuation);
        },
    },
    Recognizer {
        name: "cme-error",
        matches: |l| l.starts_with("+CME ERROR:"),
        handle: |_, l, fx| fx.push(Effect::Publish(ModemEvent::modem_error(l))),
    },
    Recognizer {
        name: "cms-error",
        matches: |l| l.starts_with("+CMS ERROR:"),
        handle: |_, l, fx| fx.push(Effect::Publish(ModemEvent::modem_error(l))),
    },
    Recognizer {
        name: "ring",
        matches: |l| l.starts_with("RING"),
        handle: |_, _, fx| fx.push(Effect::Publish(ModemEvent::Ring)),
    },
    Recognizer {
        name: "no-carrier",
        matches: |l| l.starts_with("NO CARRIER"),
        handle: |_, _, fx| fx.push(Effect::Publish(ModemEvent::Hangup)),
    },
    Recognizer {
        name: "clip",
        matches: |l| l.starts_with("+CLIP:"),
        handle: |_, l, fx| {
            fx.push(Effect::Publish(ModemEvent::CallerId(protocol::parse_clip(l))))
        },
    },
    Recognizer {
        name: "cmt",
        matches: |l| l.starts_with("+CMT:"),
        handle: |s, l, _| s.begin_capture(l, Continuation::AwaitingSmsNotify),
    },
    Recognizer {
        name: "cmgs",
        matches: |l| protocol::parse_cmgs(l).is_some(),
        handle: |_, l, fx| {
            if let Some(mr) = protocol::parse_cmgs(l) {
                fx.push(Effect::Publish(ModemEvent::SmsSent(mr)));
            }
        },
    },
    Recognizer {
        name: "csq",
        matches: |l| protocol::parse_csq(l).is_some(),
        handle: |_, l, fx| {
            if let Some((rssi, ber)) = protocol::parse_csq(l) {
                fx.push(Effect::Publish(ModemEvent::SignalQuality(SignalQuality {
                    rssi,
                    ber,
                })));
            }
        },
    },
    Recognizer {
        // Status reports are requested on send but not surfaced.
        name: "cds",
        matches: |l| l.starts_with("+CDS:"),
        handle: |_, _, _| {},
    },
];

/// Kind of multi-line reply being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Sms,
}

/// Protocol state for one modem connection.
pub struct ModemSession {
    capturing: Capture,
    capture_buffer: String,
    last_line_was_blank: bool,
    sms_ready: bool,
    call_ready: bool,
    /// Continuation bound to the capture in progress.
    pending_continuation: Option<Continuation>,
    /// Continuation registered by an outstanding `AT+CMGR`, claimed by the
    /// next `+CMGR:` header.
    awaiting_read: Option<Continuation>,
    reassembler: Reassembler,
    codec: Arc<dyn PduCodec>,
}

impl ModemSession {
    pub fn new(codec: Arc<dyn PduCodec>) -> Self {
        ModemSession {
            capturing: Capture::None,
            capture_buffer: String::new(),
            last_line_was_blank: false,
            sms_ready: false,
            call_ready: false,
            pending_continuation: None,
            awaiting_read: None,
            reassembler: Reassembler::new(),
            codec,
        }
    }

    /// Register that `AT+CMGR=<id>` has been issued.
    pub fn expect_read(&mut self, id: u32) {
        self.awaiting_read = Some(Continuation::AwaitingSmsRead { id });
    }

    /// Withdraw a registered read that will not be answered.
    ///
    /// A capture already bound to the read is left to finish; its result
    /// carries the read's continuation.
    pub fn cancel_read(&mut self) {
        self.awaiting_read = None;
    }

    /// Readiness flags seen so far.
    pub fn status(&self) -> ModemStatus {
        ModemStatus {
            sms_ready: self.sms_ready,
            call_ready: self.call_ready,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing != Capture::None
    }

    /// Incomplete multipart groups held by the reassembler.
    pub fn pending_groups(&self) -> usize {
        self.reassembler.len()
    }

    /// Drop multipart groups started more than `max_age` before `now`.
    pub fn evict_stale_fragments(&mut self, max_age: Duration, now: Instant) -> Vec<u16> {
        self.reassembler.evict_older_than(max_age, now)
    }

    /// Drop capture and read state on teardown.
    ///
    /// Returns the continuations that will never be resolved.
    pub fn reset(&mut self) -> Vec<Continuation> {
        let dropped = self
            .pending_continuation
            .take()
            .into_iter()
            .chain(self.awaiting_read.take())
            .collect();
        self.capturing = Capture::None;
        self.capture_buffer.clear();
        self.last_line_was_blank = false;
        dropped
    }

    /// Process one line of modem output.
    pub fn feed_line(&mut self, line: &str) -> Vec<Effect> {
        let mut effects = vec![Effect::Publish(ModemEvent::RawLine(line.to_string()))];

        if self.is_capturing() {
            self.capture_buffer.push('\n');
            self.capture_buffer.push_str(line);
            self.finish_capture(&mut effects);
        } else if let Some(r) = RECOGNIZERS.iter().find(|r| (r.matches)(line)) {
            tracing::trace!(recognizer = r.name, line, "dispatch");
            (r.handle)(self, line, &mut effects);
        }

        if self.last_line_was_blank && line.starts_with("OK") {
            if self.is_capturing() {
                self.finish_capture(&mut effects);
            }
            effects.push(Effect::Publish(ModemEvent::CommandComplete));
        }

        self.last_line_was_blank = protocol::is_blank(line);
        effects
    }

    fn begin_capture(&mut self, header: &str, continuation: Continuation) {
        tracing::debug!(?continuation, "capturing SMS reply");
        self.capturing = Capture::Sms;
        self.capture_buffer = header.to_string();
        self.pending_continuation = Some(continuation);
    }

    /// Hand the capture to its continuation and leave capture mode, even
    /// when decoding fails.
    fn finish_capture(&mut self, effects: &mut Vec<Effect>) {
        let captured = std::mem::take(&mut self.capture_buffer);
        self.capturing = Capture::None;
        let Some(continuation) = self.pending_continuation.take() else {
            return;
        };

        match reassembly::decode_capture(self.codec.as_ref(), &captured) {
            Ok(fragment) => match self.reassembler.accept(fragment) {
                Assembly::Complete { message, reference } => effects.push(Effect::SmsResolved {
                    continuation,
                    message,
                    reference,
                }),
                Assembly::Incomplete { reference } => effects.push(Effect::SmsIncomplete {
                    continuation,
                    reference,
                }),
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode captured SMS");
                effects.push(Effect::Publish(ModemEvent::protocol_error(format!(
                    "{e}: {captured}"
                ))));
                effects.push(Effect::CaptureFailed {
                    continuation,
                    error: e.to_string(),
                });
            }
        }
    }
}
