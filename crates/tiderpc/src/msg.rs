//! # Messages
//!
//! The concrete bodies carried inside an envelope.
//!
//! ## Invariants
//! - **Exact Sizing**: `Msg::size()` equals the bytes `Msg::write()` produces.
//!   The codec verifies this on every encode; a mismatch would desync every
//!   frame after it on the same stream.
//! - **Stable Ids**: builtin ids are fixed constants below `msg_id::CUSTOMIZE`;
//!   user messages derive theirs from their type name (see `custom_msg_id`).
//!
//! ## Wire Format
//! - `MsgRpcRequest`: `[CorrId: varint][CallChain][Path: str][Args: array]`
//! - `MsgRpcReply`:   `[CorrId: varint][Rets: array][HasError: u8][Error?]`
//! - `MsgOneWayRpc`:  `[CallChain][Path: str][Args: array]`
//! - `MsgForward`:    `[Transit: str][Dst: str][CorrId: varint][TransId: u32][TransData: bytes]`

use std::any::Any;
use std::fmt::Debug;

use bytes::Bytes;
use tidepack::Writer;
use tidepack::size;

use crate::callchain::CallChain;
use crate::error::Result;
use crate::input::Input;
use crate::value::Fault;
use crate::value::Value;
use crate::value::array_size;
use crate::value::read_array;
use crate::value::write_array;

/// Numeric message type identifier.
pub type MsgId = u32;

pub mod msg_id {
    use super::MsgId;

    pub const NONE: MsgId = 0;
    pub const RPC_REQUEST: MsgId = 1;
    pub const RPC_REPLY: MsgId = 2;
    pub const ONE_WAY_RPC: MsgId = 3;
    pub const FORWARD: MsgId = 4;
    /// First id available to user-defined messages.
    pub const CUSTOMIZE: MsgId = 32;
}

/// Downcasting support for boxed messages.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any { self }
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> { self }
}

/// A message body that knows its id, its exact size, and how to move
/// itself on and off the wire.
pub trait Msg: AsAny + Debug {
    fn msg_id(&self) -> MsgId;
    fn size(&self) -> usize;
    fn write(&self, w: &mut Writer) -> Result<()>;
    /// Populates `self` from the body bytes.
    fn read(&mut self, input: &mut Input<'_>) -> Result<()>;
}

/// 32-bit FNV-1a.
fn fnv1a32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in data {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Deterministic id for a user-defined message, derived from its
/// fully-qualified type name and kept clear of the builtin range.
pub fn custom_msg_id<T: ?Sized>() -> MsgId {
    let id = fnv1a32(std::any::type_name::<T>().as_bytes());
    if id < msg_id::CUSTOMIZE { id + msg_id::CUSTOMIZE } else { id }
}

// ============================================================================
//  BUILTIN MESSAGES
// ============================================================================

/// A correlated call expecting a `MsgRpcReply`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgRpcRequest {
    pub corr_id: i64,
    pub call_chain: CallChain,
    pub path: String,
    pub args: Vec<Value>,
}

impl Msg for MsgRpcRequest {
    fn msg_id(&self) -> MsgId { msg_id::RPC_REQUEST }

    fn size(&self) -> usize {
        size::varint(self.corr_id)
            + self.call_chain.size()
            + size::str(&self.path)
            + array_size(&self.args)
    }

    fn write(&self, w: &mut Writer) -> Result<()> {
        w.varint(self.corr_id);
        self.call_chain.write(w);
        w.str(&self.path);
        write_array(w, &self.args)
    }

    fn read(&mut self, input: &mut Input<'_>) -> Result<()> {
        self.corr_id = input.varint()?;
        self.call_chain = CallChain::read(input)?;
        self.path = input.str()?.to_string();
        self.args = read_array(input)?;
        Ok(())
    }
}

/// The answer to a `MsgRpcRequest`, matched by `corr_id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgRpcReply {
    pub corr_id: i64,
    pub rets: Vec<Value>,
    pub error: Option<Fault>,
}

impl Msg for MsgRpcReply {
    fn msg_id(&self) -> MsgId { msg_id::RPC_REPLY }

    fn size(&self) -> usize {
        size::varint(self.corr_id)
            + array_size(&self.rets)
            + 1
            + self.error.as_ref().map_or(0, Fault::size)
    }

    fn write(&self, w: &mut Writer) -> Result<()> {
        w.varint(self.corr_id);
        write_array(w, &self.rets)?;
        match &self.error {
            Some(fault) => {
                w.bool(true);
                fault.write(w);
            }
            None => w.bool(false),
        }
        Ok(())
    }

    fn read(&mut self, input: &mut Input<'_>) -> Result<()> {
        self.corr_id = input.varint()?;
        self.rets = read_array(input)?;
        self.error = if input.bool()? { Some(Fault::read(input)?) } else { None };
        Ok(())
    }
}

/// A fire-and-forget call; no reply is ever produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgOneWayRpc {
    pub call_chain: CallChain,
    pub path: String,
    pub args: Vec<Value>,
}

impl Msg for MsgOneWayRpc {
    fn msg_id(&self) -> MsgId { msg_id::ONE_WAY_RPC }

    fn size(&self) -> usize {
        self.call_chain.size() + size::str(&self.path) + array_size(&self.args)
    }

    fn write(&self, w: &mut Writer) -> Result<()> {
        self.call_chain.write(w);
        w.str(&self.path);
        write_array(w, &self.args)
    }

    fn read(&mut self, input: &mut Input<'_>) -> Result<()> {
        self.call_chain = CallChain::read(input)?;
        self.path = input.str()?.to_string();
        self.args = read_array(input)?;
        Ok(())
    }
}

/// An already-encoded inner message relayed across the client boundary.
///
/// The relay only reads `dst` to route; `trans_data` is opaque to it and is
/// a zero-copy view into the frame it arrived in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgForward {
    /// Address replies must travel back through.
    pub transit: String,
    /// Final destination address.
    pub dst: String,
    pub corr_id: i64,
    /// Message id of `trans_data`.
    pub trans_id: MsgId,
    /// The inner message body.
    pub trans_data: Bytes,
}

impl Msg for MsgForward {
    fn msg_id(&self) -> MsgId { msg_id::FORWARD }

    fn size(&self) -> usize {
        size::str(&self.transit)
            + size::str(&self.dst)
            + size::varint(self.corr_id)
            + 4
            + size::bytes(&self.trans_data)
    }

    fn write(&self, w: &mut Writer) -> Result<()> {
        w.str(&self.transit);
        w.str(&self.dst);
        w.varint(self.corr_id);
        w.u32(self.trans_id);
        w.bytes(&self.trans_data);
        Ok(())
    }

    fn read(&mut self, input: &mut Input<'_>) -> Result<()> {
        self.transit = input.str()?.to_string();
        self.dst = input.str()?.to_string();
        self.corr_id = input.varint()?;
        self.trans_id = input.u32()?;
        self.trans_data = input.shared_bytes()?;
        Ok(())
    }
}
