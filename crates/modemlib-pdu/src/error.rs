//! PDU codec errors.

/// Failure to decode or encode an SMS PDU.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PduError {
    /// The input is not an even-length string of hex digits.
    #[error("invalid hex in PDU: {0}")]
    InvalidHex(String),

    /// The PDU ended before the named field.
    #[error("PDU truncated at {0}")]
    Truncated(&'static str),

    /// The TP-MTI names a message type this codec does not handle.
    #[error("unsupported message type indicator {0:#04x}")]
    UnsupportedMessageType(u8),

    /// The destination address is empty or contains characters that cannot
    /// be semi-octet encoded.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// The text contains a character the chosen alphabet cannot carry.
    #[error("text cannot be encoded: {0:?}")]
    Unencodable(String),

    /// The text needs more segments than a concatenation header can number.
    #[error("message needs {0} segments, at most 255 are possible")]
    TooManySegments(usize),
}

impl From<PduError> for modemlib_core::Error {
    fn from(e: PduError) -> Self {
        modemlib_core::Error::Protocol(e.to_string())
    }
}
