//! # TideRun
//!
//! The runtime engine of tide: everything between a caller naming a target
//! and a handler running on some node, and back.
//!
//! ## Architecture
//!
//! ```text
//!  Rpc ──> Deliverer (first match) ──> Network::send ──> Broker
//!                                                          │
//!  Targets <── Dispatcher (first accept) <── pump (dedup) <┘
//!     │
//!     └─ reply ──> Network::send ──> ... ──> Futures::resolve
//! ```
//!
//! - **Addressing**: `address::NodeDetails` builds every topic.
//! - **Correlation**: `pending::Futures` pairs requests with replies under a
//!   timeout, a cancellation token and registry shutdown.
//! - **Collaborators**: the broker, the entity locator and the session router
//!   are traits with in-memory implementations for tests and embedding.
//! - **Gates**: `gate` relays calls across the client boundary.

pub mod address;
pub mod broker;
pub mod config;
pub mod dedup;
pub mod deliverer;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod handler;
pub mod locator;
pub mod memory_broker;
pub mod net;
pub mod node;
pub mod pending;
pub mod permission;
pub mod rpc;
pub mod target;

pub use address::AddrKind;
pub use address::NodeDetails;
pub use broker::Broker;
pub use broker::DeliveryReliability;
pub use config::RpcConfig;
pub use deliverer::Deliverer;
pub use dispatcher::Dispatcher;
pub use error::CallError;
pub use gate::GateInbound;
pub use gate::MemorySessions;
pub use gate::SessionRouter;
pub use handler::Args;
pub use handler::CallContext;
pub use handler::MethodTable;
pub use handler::Rets;
pub use locator::DistEntity;
pub use locator::DistNode;
pub use locator::EntityLocator;
pub use locator::MemoryLocator;
pub use memory_broker::MemoryBroker;
pub use node::BuildError;
pub use node::Node;
pub use node::NodeBuilder;
pub use pending::AsyncRet;
pub use pending::Futures;
pub use pending::Ret;
pub use permission::PermissionValidator;
pub use rpc::Rpc;
pub use target::Targets;
