//! Error types for modemlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! modem-reported errors are all captured here.

/// The error type for all modemlib operations.
///
/// Variants cover the failure modes encountered when driving a modem over a
/// serial link: physical transport failures, undecodable replies, errors the
/// modem reports itself (`+CME ERROR`, `+CMS ERROR`), and lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/close/write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed PDU, unparseable reply line).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The modem answered with `+CME ERROR:` or `+CMS ERROR:`.
    ///
    /// Carries the raw text of the error line.
    #[error("modem error: {0}")]
    Modem(String),

    /// Timed out waiting for a response from the modem.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a modem operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the modem has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the modem was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The session was stopped while the operation was still pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// An audio or diagnostic stream was closed unexpectedly.
    #[error("stream closed")]
    StreamClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
