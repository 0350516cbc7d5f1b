//! Errors produced while decoding, parsing or reassembling provisioning frames.

use std::fmt;

/// Errors that can occur on the provisioning wire protocol.
///
/// All variants are local and recoverable: the offending frame or message
/// is dropped and the caller decides what to tell the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input is shorter than a frame header.
    TooShort { len: usize, min: usize },
    /// A header field does not fit in its bit width.
    OutOfRange {
        field: &'static str,
        value: usize,
        max: usize,
    },
    /// Declared `frame_len` disagrees with the bytes actually present.
    LengthMismatch { declared: usize, actual: usize },
    /// A length-prefixed field is missing or exceeds its bounds.
    TruncatedField { field: &'static str },
    /// The payload is structurally invalid.
    MalformedPayload(String),
    /// Command code is not handled by this device.
    UnsupportedCommand(u8),
    /// Message does not fit in the maximum number of frames.
    MessageTooLong { len: usize, max: usize },
    /// Frame contradicts the message it claims to belong to.
    InconsistentFrame(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len, min } => {
                write!(f, "frame too short: {} bytes (min {})", len, min)
            }
            Self::OutOfRange { field, value, max } => {
                write!(f, "{} out of range: {} (max {})", field, value, max)
            }
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "frame length mismatch: header declares {} bytes, got {}",
                declared, actual
            ),
            Self::TruncatedField { field } => write!(f, "truncated {} field", field),
            Self::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
            Self::UnsupportedCommand(cmd) => write!(f, "unsupported command 0x{:02X}", cmd),
            Self::MessageTooLong { len, max } => {
                write!(f, "message too long: {} bytes (max {})", len, max)
            }
            Self::InconsistentFrame(msg) => write!(f, "inconsistent frame: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}
