//! Asynchronous modem event types.
//!
//! Events are emitted by the AT engine through a [`tokio::sync::broadcast`]
//! channel as lines arrive from the modem. Applications subscribe to react to
//! incoming calls and messages without polling.

use crate::types::{AssembledMessage, SignalQuality};

/// Category of an [`ModemEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Serial open/close/write failure. The session is unusable until
    /// it is rebuilt.
    Transport,
    /// A reply could not be decoded (bad PDU, unparseable line).
    Protocol,
    /// The modem reported `+CME ERROR` or `+CMS ERROR`.
    Modem,
}

/// An event emitted by the modem driver.
///
/// Subscribe via `Modem::subscribe()` in `modemlib-at`.
/// Events are delivered through a bounded broadcast channel; publishing never
/// waits on subscribers, so a slow consumer may observe
/// `RecvError::Lagged` and miss events.
#[derive(Debug, Clone, PartialEq)]
pub enum ModemEvent {
    /// Every line received from the modem, before any interpretation.
    RawLine(String),

    /// An incoming call is ringing.
    Ring,

    /// The call ended (`NO CARRIER`).
    Hangup,

    /// Caller ID of the incoming call. Empty when the `+CLIP` line could
    /// not be parsed.
    CallerId(String),

    /// A complete SMS, reassembled if it was sent in several parts.
    Sms(AssembledMessage),

    /// The modem accepted an outgoing SMS segment and assigned it this
    /// message reference.
    SmsSent(u32),

    /// The application answered an incoming call.
    Answer,

    /// An error occurred. Processing of later lines continues.
    Error {
        /// What failed.
        kind: ErrorKind,
        /// Raw modem text or a description of the failure.
        detail: String,
    },

    /// The modem finished a command (blank line followed by `OK`).
    CommandComplete,

    /// The modem printed `SMS Ready`.
    SmsReady,

    /// The modem printed `Call Ready`.
    CallReady,

    /// Signal quality reply to `AT+CSQ`.
    SignalQuality(SignalQuality),

    /// The session stopped and the transport was closed.
    Disconnected,
}

impl ModemEvent {
    /// Shorthand for a protocol-category error event.
    pub fn protocol_error(detail: impl Into<String>) -> Self {
        ModemEvent::Error {
            kind: ErrorKind::Protocol,
            detail: detail.into(),
        }
    }

    /// Shorthand for a modem-category error event.
    pub fn modem_error(detail: impl Into<String>) -> Self {
        ModemEvent::Error {
            kind: ErrorKind::Modem,
            detail: detail.into(),
        }
    }

    /// Shorthand for a transport-category error event.
    pub fn transport_error(detail: impl Into<String>) -> Self {
        ModemEvent::Error {
            kind: ErrorKind::Transport,
            detail: detail.into(),
        }
    }
}
