//! # Deliverers
//!
//! The outbound half of the pipeline. `Rpc` asks each deliverer, in
//! registration order, whether it `matches` a destination, and hands the call
//! to the first one that does. More specific deliverers are registered first
//! so they take priority over catch-all forwarding.
//!
//! - `ServiceDeliverer`: destinations inside the service domain.
//! - `ForwardDeliverer`: client destinations, relayed through the gate that
//!   owns the client's session.

mod forward;
mod service;

pub use forward::ForwardDeliverer;
pub use service::ServiceDeliverer;

use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::Value;
use tokio_util::sync::CancellationToken;

use crate::error::CallError;
use crate::pending::AsyncRet;

/// Outbound routing strategy.
///
/// This trait is designed to be object-safe (`Arc<dyn Deliverer>`).
#[async_trait::async_trait]
pub trait Deliverer: Send + Sync + 'static {
    /// Whether this deliverer can carry a call to `dst`.
    fn matches(&self, dst: &str, chain: &CallChain, path: &CallPath, one_way: bool) -> bool;

    /// Sends a request. Failures detected before or while sending surface
    /// through the returned `AsyncRet`.
    async fn request(
        &self,
        ctx: &CancellationToken,
        dst: &str,
        chain: CallChain,
        path: &CallPath,
        args: Vec<Value>,
    ) -> AsyncRet;

    /// Sends a one-way call.
    async fn notify(&self, dst: &str, chain: CallChain, path: &CallPath, args: Vec<Value>) -> Result<(), CallError>;
}
