//! # RPC Façade
//!
//! The caller's entry point. Holds the ordered deliverer list and routes each
//! call to the first deliverer that matches its destination.
//!
//! ```rust,ignore
//! let ret = node.rpc().call("service.lb.bag", &CallPath::service("bag", "count"), vec![]).await?;
//! ```
//!
//! ## Invariants
//! - **First Match Wins**: deliverers are consulted in registration order; no
//!   deliverer sees a call an earlier one matched.
//! - **Undeliverable**: when nothing matches, requests complete with
//!   `Undeliverable` and notifications return it.
//! - **Bounded Chains**: a chain longer than the configured depth is not sent.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::Value;

use crate::config::RpcConfig;
use crate::deliverer::Deliverer;
use crate::error::CallError;
use crate::pending::AsyncRet;
use crate::pending::Ret;

struct Inner {
    deliverers: Vec<Arc<dyn Deliverer>>,
    config: RpcConfig,
    ctx: CancellationToken,
}

/// Cheap to clone; clones share the deliverer list.
#[derive(Clone)]
pub struct Rpc {
    inner: Arc<Inner>,
}

impl Rpc {
    /// `ctx` is the default cancellation context of calls made without one.
    pub fn new(deliverers: Vec<Arc<dyn Deliverer>>, config: RpcConfig, ctx: CancellationToken) -> Self {
        Self { inner: Arc::new(Inner { deliverers, config, ctx }) }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    fn select(&self, dst: &str, chain: &CallChain, path: &CallPath, one_way: bool) -> Result<&Arc<dyn Deliverer>, CallError> {
        if chain.len() > self.inner.config.max_call_depth {
            return Err(CallError::ChainTooDeep(format!(
                "{} hops, limit {}",
                chain.len(),
                self.inner.config.max_call_depth
            )));
        }
        self.inner
            .deliverers
            .iter()
            .find(|d| d.matches(dst, chain, path, one_way))
            .ok_or_else(|| CallError::Undeliverable(dst.to_string()))
    }

    /// Sends a request with an explicit context and chain, returning the
    /// pending reply.
    pub async fn request_with(
        &self,
        ctx: &CancellationToken,
        dst: &str,
        chain: CallChain,
        path: &CallPath,
        args: Vec<Value>,
    ) -> AsyncRet {
        match self.select(dst, &chain, path, false) {
            Ok(deliverer) => deliverer.request(ctx, dst, chain, path, args).await,
            Err(e) => AsyncRet::ready(Err(e)),
        }
    }

    /// Sends a direct request, returning the pending reply.
    pub async fn request(&self, dst: &str, path: &CallPath, args: Vec<Value>) -> AsyncRet {
        self.request_with(&self.inner.ctx, dst, CallChain::EMPTY, path, args).await
    }

    /// Sends a direct request and waits for its reply.
    pub async fn call(&self, dst: &str, path: &CallPath, args: Vec<Value>) -> Ret {
        self.request(dst, path, args).await.await
    }

    pub async fn notify_with(&self, dst: &str, chain: CallChain, path: &CallPath, args: Vec<Value>) -> Result<(), CallError> {
        let deliverer = self.select(dst, &chain, path, true)?;
        deliverer.notify(dst, chain, path, args).await
    }

    pub async fn notify(&self, dst: &str, path: &CallPath, args: Vec<Value>) -> Result<(), CallError> {
        self.notify_with(dst, CallChain::EMPTY, path, args).await
    }
}

impl std::fmt::Debug for Rpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rpc")
            .field("deliverers", &self.inner.deliverers.len())
            .field("config", &self.inner.config)
            .finish()
    }
}
