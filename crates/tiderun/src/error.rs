//! # Call Errors
//!
//! Everything that can go wrong with a single call, from routing to execution.
//!
//! ## Invariants
//! - **Lossless on the wire**: every variant maps to a `Fault` with a
//!   well-known code and back, so a `PermissionDenied` raised on a remote node
//!   surfaces as `PermissionDenied` on the caller, not as a generic failure.
//! - **Distinct terminations**: `Timeout`, `Cancelled` and `Closed` are separate
//!   so callers can tell "no reply in time" from "explicitly cancelled" from
//!   "shutting down".

use tiderpc::Fault;
use tiderpc::code;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// No deliverer accepted the destination.
    Undeliverable(String),
    /// The target entity or node is not known to discovery (yet).
    Unresolved(String),
    /// The permission validator rejected the call.
    PermissionDenied(String),
    /// An envelope or message body failed to decode.
    Decode(String),
    /// The call path is malformed or not valid at this node.
    InvalidPath(String),
    /// No reply arrived before the deadline.
    Timeout,
    /// The caller's context was cancelled.
    Cancelled,
    /// The futures registry shut down.
    Closed,
    /// Argument or result count/type did not fit the target.
    TypeMismatch(String),
    /// Plugin, component, method, entity or future was not found.
    NotFound(String),
    /// The call chain is longer than the configured maximum.
    ChainTooDeep(String),
    /// The target panicked while executing.
    Panicked(String),
    /// The target returned an error.
    Failed(String),
    /// The broker refused to publish or subscribe.
    Broker(String),
    /// A remote fault with a code this node does not know.
    Remote(Fault),
}

impl CallError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Undeliverable(_) => code::UNDELIVERABLE,
            Self::Unresolved(_) => code::UNRESOLVED,
            Self::PermissionDenied(_) => code::PERMISSION_DENIED,
            Self::Decode(_) => code::DECODE,
            Self::InvalidPath(_) => code::INVALID_PATH,
            Self::Timeout => code::TIMEOUT,
            Self::Cancelled => code::CANCELLED,
            Self::Closed => code::CLOSED,
            Self::TypeMismatch(_) => code::TYPE_MISMATCH,
            Self::NotFound(_) => code::NOT_FOUND,
            Self::ChainTooDeep(_) => code::CHAIN_TOO_DEEP,
            Self::Panicked(_) => code::PANICKED,
            Self::Failed(_) => code::FAILED,
            Self::Broker(_) => code::BROKER,
            Self::Remote(fault) => fault.code,
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::Undeliverable(m)
            | Self::Unresolved(m)
            | Self::PermissionDenied(m)
            | Self::Decode(m)
            | Self::InvalidPath(m)
            | Self::TypeMismatch(m)
            | Self::NotFound(m)
            | Self::ChainTooDeep(m)
            | Self::Panicked(m)
            | Self::Failed(m)
            | Self::Broker(m) => m,
            Self::Timeout | Self::Cancelled | Self::Closed => "",
            Self::Remote(fault) => &fault.message,
        }
    }

    /// The wire form carried in `MsgRpcReply::error`.
    pub fn to_fault(&self) -> Fault {
        Fault::new(self.code(), self.detail())
    }

    /// Rebuilds the error a remote node reported.
    pub fn from_fault(fault: Fault) -> Self {
        let Fault { code: c, message: m } = fault;
        match c {
            code::UNDELIVERABLE => Self::Undeliverable(m),
            code::UNRESOLVED => Self::Unresolved(m),
            code::PERMISSION_DENIED => Self::PermissionDenied(m),
            code::DECODE => Self::Decode(m),
            code::INVALID_PATH => Self::InvalidPath(m),
            code::TIMEOUT => Self::Timeout,
            code::CANCELLED => Self::Cancelled,
            code::CLOSED => Self::Closed,
            code::TYPE_MISMATCH => Self::TypeMismatch(m),
            code::NOT_FOUND => Self::NotFound(m),
            code::CHAIN_TOO_DEEP => Self::ChainTooDeep(m),
            code::PANICKED => Self::Panicked(m),
            code::FAILED => Self::Failed(m),
            code::BROKER => Self::Broker(m),
            _ => Self::Remote(Fault { code: c, message: m }),
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undeliverable(m) => write!(f, "Undeliverable: {}", m),
            Self::Unresolved(m) => write!(f, "Unresolved target: {}", m),
            Self::PermissionDenied(m) => write!(f, "Permission denied: {}", m),
            Self::Decode(m) => write!(f, "Decode failure: {}", m),
            Self::InvalidPath(m) => write!(f, "Invalid call path: {}", m),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Cancelled => write!(f, "Request cancelled"),
            Self::Closed => write!(f, "Futures closed"),
            Self::TypeMismatch(m) => write!(f, "Type mismatch: {}", m),
            Self::NotFound(m) => write!(f, "Not found: {}", m),
            Self::ChainTooDeep(m) => write!(f, "Call chain too deep: {}", m),
            Self::Panicked(m) => write!(f, "Target panicked: {}", m),
            Self::Failed(m) => write!(f, "Call failed: {}", m),
            Self::Broker(m) => write!(f, "Broker error: {}", m),
            Self::Remote(fault) => write!(f, "Remote fault {}", fault),
        }
    }
}

impl std::error::Error for CallError {}

impl From<tiderpc::Error> for CallError {
    fn from(e: tiderpc::Error) -> Self {
        match e {
            tiderpc::Error::TypeMismatch { expected, found } => {
                Self::TypeMismatch(format!("expected {}, found {}", expected, found))
            }
            tiderpc::Error::InvalidCallPath(m) => Self::InvalidPath(m),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<Fault> for CallError {
    fn from(fault: Fault) -> Self {
        Self::from_fault(fault)
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
