//! # Dispatchers
//!
//! The inbound half of the pipeline. Each pump hands every decoded envelope
//! to the first dispatcher, in registration order, that accepts it.
//!
//! - `ServiceDispatcher` executes calls addressed to this node and resolves
//!   replies to calls it made.
//! - `GateOutbound` (see `crate::gate`) relays forwards addressed to clients.

mod service;

pub use service::ServiceDispatcher;

use tiderpc::Envelope;

/// Inbound routing strategy.
///
/// This trait is designed to be object-safe (`Arc<dyn Dispatcher>`).
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Cheap, synchronous test of whether this dispatcher handles `env`.
    fn accepts(&self, env: &Envelope) -> bool;

    /// Handles `env`. Must return promptly; long work belongs on a spawned task.
    async fn dispatch(&self, env: Envelope);
}
