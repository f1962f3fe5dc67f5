//! # TideRPC
//!
//! The wire protocol of the tide runtime: variant values, call paths and
//! chains, the builtin RPC messages, and the envelope codec that frames them.
//!
//! ## Architecture
//!
//! - **Primitives**: all bytes go through `tidepack`, so every field is
//!   bounds-checked and big-endian.
//! - **Messages**: each body implements `Msg` and reports its exact size.
//! - **Registry**: `MsgRegistry` maps ids to prototypes; it is an explicit
//!   value, shared between nodes of one process through an `Arc`.
//! - **Codec**: `Codec` writes and validates the envelope head, then hands
//!   the body to the registered prototype.

pub mod callchain;
pub mod callpath;
pub mod codec;
pub mod convert;
pub mod error;
pub mod input;
pub mod msg;
pub mod registry;
pub mod value;

#[cfg(test)]
mod tests;

pub use callchain::Call;
pub use callchain::CallChain;
pub use callpath::CallPath;
pub use callpath::Category;
pub use codec::Codec;
pub use codec::Envelope;
pub use codec::MsgHead;
pub use codec::Origin;
pub use convert::FromValue;
pub use convert::IntoValue;
pub use error::Error;
pub use error::Result;
pub use input::Input;
pub use msg::Msg;
pub use msg::MsgForward;
pub use msg::MsgId;
pub use msg::MsgOneWayRpc;
pub use msg::MsgRpcReply;
pub use msg::MsgRpcRequest;
pub use msg::custom_msg_id;
pub use msg::msg_id;
pub use registry::MsgRegistry;
pub use value::Fault;
pub use value::Value;
pub use value::code;
