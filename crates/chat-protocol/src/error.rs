use std::fmt;

/// Errors that can arise when encoding/decoding a frame on either transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short for the expected fields.
    Truncated,
    /// Unknown datagram message type.
    UnknownMessageType(u8),
    /// Unknown text keyword.
    UnknownKeyword(String),
    /// The line or datagram does not follow the message grammar.
    Malformed(&'static str),
    /// A field violates its length or alphabet limits.
    InvalidField(&'static str),
    /// Text frame is not valid UTF-8.
    InvalidUtf8,
    /// The message cannot be carried by this transport (e.g. CONFIRM over text).
    Unsupported(&'static str),
    /// A partial stream frame outgrew the configured limit.
    FrameTooLong(usize),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Truncated => write!(f, "Buffer truncated"),
            ProtocolError::UnknownMessageType(t) => write!(f, "Unknown message type: {:#04x}", t),
            ProtocolError::UnknownKeyword(k) => write!(f, "Unknown keyword: {}", k),
            ProtocolError::Malformed(what) => write!(f, "Malformed {}", what),
            ProtocolError::InvalidField(field) => write!(f, "Invalid field: {}", field),
            ProtocolError::InvalidUtf8 => write!(f, "Frame is not valid UTF-8"),
            ProtocolError::Unsupported(what) => write!(f, "Unsupported on this transport: {}", what),
            ProtocolError::FrameTooLong(len) => write!(f, "Frame too long: {} bytes", len),
        }
    }
}

impl std::error::Error for ProtocolError {}
