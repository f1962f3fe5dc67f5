//! # Gate Forwarding
//!
//! A gate is a service node that also holds client sessions. It relays in
//! both directions without interpreting the calls it carries:
//!
//! ```text
//! client ──frame──> GateInbound ──MsgForward{transit: gate}──> service node
//! client <─frame─── GateOutbound <─MsgForward{dst: client}──── service node
//! ```
//!
//! ## Invariants
//! - **Opaque Payload**: a forward's inner message travels as
//!   `(trans_id, trans_data)`; the relay reads only `dst` to route, except
//!   where it must swap a request's correlation id for its own.
//! - **Trusted Hop**: every client call gets exactly one hop recorded by the
//!   gate, naming the client's address, so service nodes can validate it.
//! - **Per-Member Failure**: a full session queue drops the frame for that
//!   session only.
//! - **Reply Ownership**: a client reply to a service-to-client request is
//!   accepted only from the session the request was queued on.

use std::sync::Arc;

use dashmap::DashMap;

mod inbound;
mod outbound;
mod session;

pub use inbound::GateInbound;
pub use outbound::GateOutbound;
pub use session::MemorySessions;
pub use session::Session;
pub use session::SessionError;
pub use session::SessionId;
pub use session::SessionRouter;

/// The session each pending service-to-client request was queued on, by gate
/// future id. Entries live exactly as long as the gate future.
pub type ReplyOwners = Arc<DashMap<i64, SessionId>>;
