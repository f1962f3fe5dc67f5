//! # Message Registry
//!
//! Maps a `MsgId` to a prototype factory so the decoder can build the right
//! concrete type before populating it.
//!
//! The registry is an explicit value owned by whoever assembles a node, not a
//! process global. Registration happens during startup; a duplicate id is a
//! configuration error and is reported, never silently replaced.

use std::collections::HashMap;

use crate::error::Error;
use crate::error::Result;
use crate::msg::Msg;
use crate::msg::MsgForward;
use crate::msg::MsgId;
use crate::msg::MsgOneWayRpc;
use crate::msg::MsgRpcReply;
use crate::msg::MsgRpcRequest;

struct Entry {
    type_name: &'static str,
    make: fn() -> Box<dyn Msg>,
}

fn make_default<T: Msg + Default>() -> Box<dyn Msg> {
    Box::new(T::default())
}

#[derive(Default)]
pub struct MsgRegistry {
    entries: HashMap<MsgId, Entry>,
}

impl MsgRegistry {
    /// An empty registry. Most callers want `with_builtins`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the four builtin RPC messages.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        // Builtin ids are distinct constants; these cannot collide.
        let _ = reg.register::<MsgRpcRequest>();
        let _ = reg.register::<MsgRpcReply>();
        let _ = reg.register::<MsgOneWayRpc>();
        let _ = reg.register::<MsgForward>();
        reg
    }

    /// Registers `T` under the id its default value reports.
    ///
    /// # Errors
    /// Returns `Error::DuplicateMsgId` if the id is already taken.
    pub fn register<T: Msg + Default>(&mut self) -> Result<MsgId> {
        let id = T::default().msg_id();
        let incoming = std::any::type_name::<T>();
        if let Some(existing) = self.entries.get(&id) {
            return Err(Error::DuplicateMsgId { id, existing: existing.type_name, incoming });
        }
        self.entries.insert(id, Entry { type_name: incoming, make: make_default::<T> });
        Ok(id)
    }

    pub fn contains(&self, id: MsgId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Name of the type registered under `id`, for diagnostics.
    pub fn type_name(&self, id: MsgId) -> Option<&'static str> {
        self.entries.get(&id).map(|e| e.type_name)
    }

    /// Builds an empty prototype for `id`.
    pub fn make(&self, id: MsgId) -> Result<Box<dyn Msg>> {
        self.entries
            .get(&id)
            .map(|e| (e.make)())
            .ok_or(Error::UnknownMsgId(id))
    }
}

impl std::fmt::Debug for MsgRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.entries.iter().map(|(id, e)| (*id, e.type_name)).collect();
        ids.sort_unstable();
        f.debug_struct("MsgRegistry").field("entries", &ids).finish()
    }
}
