//! # Error Definitions
//!
//! The central ledger of all encoding, decoding and protocol failures.

use tidepack::Error as PackError;

use crate::msg::MsgId;

/// Operational failures within the wire protocol itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The underlying primitive stream failed (e.g., buffer exhaustion).
    Pack(PackError),
    /// The buffer is shorter than a length or count read from it requires.
    ShortBuffer { expected: usize, actual: usize },
    /// The envelope head announced a length smaller than the head itself.
    InvalidLength(u32),
    /// No prototype is registered for this message id.
    UnknownMsgId(MsgId),
    /// A second prototype was registered for an id already in use.
    DuplicateMsgId { id: MsgId, existing: &'static str, incoming: &'static str },
    /// `size()` disagreed with the number of bytes the writer produced.
    SizeMismatch { msg_id: MsgId, expected: usize, actual: usize },
    /// The body parsed cleanly but did not consume every announced byte.
    TrailingBytes { msg_id: MsgId, remaining: usize },
    /// An unknown variant value tag was encountered.
    UnknownValueTag(u8),
    /// The nested depth of the values exceeded the safety limit.
    RecursionLimitExceeded,
    /// A call path failed to encode or parse.
    InvalidCallPath(String),
    /// A value could not be converted into the requested type.
    TypeMismatch { expected: String, found: String },
    /// The encoded message exceeds `u32::MAX` bytes.
    MessageTooLarge(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Pack(e) => write!(f, "Primitive stream error: {}", e),
            Error::ShortBuffer { expected, actual } => {
                write!(f, "Short buffer: needs {} bytes, got {}", expected, actual)
            }
            Error::InvalidLength(len) => write!(f, "Invalid envelope length: {}", len),
            Error::UnknownMsgId(id) => write!(f, "Unknown message id: {}", id),
            Error::DuplicateMsgId { id, existing, incoming } => write!(
                f,
                "Message id {} registered twice: '{}' and '{}'",
                id, existing, incoming
            ),
            Error::SizeMismatch { msg_id, expected, actual } => write!(
                f,
                "Message {} size mismatch: size() reported {}, writer produced {}",
                msg_id, expected, actual
            ),
            Error::TrailingBytes { msg_id, remaining } => {
                write!(f, "Message {} left {} trailing bytes", msg_id, remaining)
            }
            Error::UnknownValueTag(tag) => write!(f, "Unknown value tag: {:#04x}", tag),
            Error::RecursionLimitExceeded => write!(f, "Value nesting exceeds the recursion limit"),
            Error::InvalidCallPath(msg) => write!(f, "Invalid call path: {}", msg),
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            Error::MessageTooLarge(len) => write!(f, "Message too large: {} bytes", len),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Pack(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PackError> for Error {
    fn from(e: PackError) -> Self { Self::Pack(e) }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
