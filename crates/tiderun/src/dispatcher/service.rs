//! Executes calls addressed to this service node.
//!
//! Per inbound request:
//!
//! ```text
//! Received -> PathParsed -> DepthChecked -> PermissionChecked -> Executing -> Replied
//!                  |              |                 |
//!                  +--------------+-----------------+-------> Replied(error)
//! ```
//!
//! One-way calls follow the same states but are dropped, with a log line,
//! wherever a request would have been answered with an error.

use std::sync::Arc;

use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::Envelope;
use tiderpc::MsgForward;
use tiderpc::MsgOneWayRpc;
use tiderpc::MsgRpcReply;
use tiderpc::MsgRpcRequest;
use tiderpc::Origin;
use tiderpc::Value;
use tiderpc::msg_id;

use crate::address::NodeDetails;
use crate::dispatcher::Dispatcher;
use crate::error::CallError;
use crate::handler::CallContext;
use crate::net::Network;
use crate::pending::Futures;
use crate::pending::Ret;
use crate::permission::Permission;
use crate::target::Targets;

/// Where the answer to a request goes.
enum ReplyTo {
    /// Straight back to the sender's address.
    Direct(String),
    /// Wrapped in a `MsgForward` for `client`, through the relay at `transit`.
    Transit { transit: String, client: String, corr_id: i64 },
}

struct Inner {
    net: Arc<Network>,
    targets: Arc<Targets>,
    futures: Futures,
    permission: Permission,
    service: NodeDetails,
    max_depth: usize,
}

#[derive(Clone)]
pub struct ServiceDispatcher {
    inner: Arc<Inner>,
}

impl ServiceDispatcher {
    pub fn new(
        net: Arc<Network>,
        targets: Arc<Targets>,
        futures: Futures,
        permission: Permission,
        service: NodeDetails,
        max_depth: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner { net, targets, futures, permission, service, max_depth }),
        }
    }

    fn prepare(&self, chain: &CallChain, path: &str) -> Result<CallPath, CallError> {
        let path = CallPath::parse(path)?;
        if chain.len() > self.inner.max_depth {
            return Err(CallError::ChainTooDeep(format!(
                "{} hops, limit {}",
                chain.len(),
                self.inner.max_depth
            )));
        }
        self.inner.permission.check(chain, &path)?;
        Ok(path)
    }

    async fn execute(&self, chain: CallChain, path: &str, args: Vec<Value>, origin: Origin) -> Ret {
        let path = self.prepare(&chain, path)?;
        self.inner.targets.invoke(CallContext::new(chain, path, origin), args).await
    }

    fn spawn_request(&self, req: MsgRpcRequest, origin: Origin, reply_to: ReplyTo) {
        let this = self.clone();
        tokio::spawn(async move {
            let MsgRpcRequest { corr_id, call_chain, path, args } = req;
            let reply = match this.execute(call_chain, &path, args, origin).await {
                Ok(rets) => MsgRpcReply { corr_id, rets, error: None },
                Err(e) => {
                    tracing::debug!(path = %path, corr_id, error = %e, "request failed");
                    MsgRpcReply { corr_id, rets: Vec::new(), error: Some(e.to_fault()) }
                }
            };
            this.reply(reply_to, reply).await;
        });
    }

    fn spawn_one_way(&self, msg: MsgOneWayRpc, origin: Origin) {
        let this = self.clone();
        tokio::spawn(async move {
            let MsgOneWayRpc { call_chain, path, args } = msg;
            let parsed = match this.prepare(&call_chain, &path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(path = %path, from = %origin.addr, error = %e, "dropping one-way call");
                    return;
                }
            };
            if parsed.exclude_src && origin.addr == this.inner.net.addr() {
                tracing::debug!(path = %path, "skipping own excluded broadcast");
                return;
            }
            if let Err(e) = this.inner.targets.invoke(CallContext::new(call_chain, parsed, origin), args).await {
                tracing::warn!(path = %path, error = %e, "one-way call failed");
            }
        });
    }

    async fn reply(&self, to: ReplyTo, reply: MsgRpcReply) {
        let net = &self.inner.net;
        let sent = match to {
            ReplyTo::Direct(addr) => net.send(&addr, &reply).await,
            ReplyTo::Transit { transit, client, corr_id } => match net.codec().encode_body(&reply) {
                Ok(body) => {
                    let forward = MsgForward {
                        transit: net.addr().to_string(),
                        dst: client,
                        corr_id,
                        trans_id: msg_id::RPC_REPLY,
                        trans_data: body,
                    };
                    net.send(&transit, &forward).await
                }
                Err(e) => Err(e.into()),
            },
        };
        if let Err(e) = sent {
            tracing::warn!(corr_id = reply.corr_id, error = %e, "failed to send reply");
        }
    }

    fn resolve(&self, reply: MsgRpcReply) {
        let MsgRpcReply { corr_id, rets, error } = reply;
        let ret = match error {
            Some(fault) => Err(CallError::from_fault(fault)),
            None => Ok(rets),
        };
        if let Err(e) = self.inner.futures.resolve(corr_id, ret) {
            // Late (after timeout) or duplicate.
            tracing::debug!(corr_id, error = %e, "reply without a pending future");
        }
    }

    fn unwrap_forward(&self, forward: MsgForward, origin: Origin) {
        let MsgForward { transit, corr_id, trans_id, trans_data, .. } = forward;
        let codec = self.inner.net.codec();
        match trans_id {
            msg_id::RPC_REQUEST => match codec.decode_body_as::<MsgRpcRequest>(trans_id, trans_data) {
                Ok(req) => {
                    // The relay recorded the client as the chain's last hop.
                    let client = req.call_chain.last().map(|c| c.addr.clone()).unwrap_or_default();
                    self.spawn_request(req, origin, ReplyTo::Transit { transit, client, corr_id });
                }
                Err(e) => tracing::warn!(transit = %transit, corr_id, error = %e, "dropping undecodable forwarded request"),
            },
            msg_id::ONE_WAY_RPC => match codec.decode_body_as::<MsgOneWayRpc>(trans_id, trans_data) {
                Ok(msg) => self.spawn_one_way(msg, origin),
                Err(e) => tracing::warn!(transit = %transit, error = %e, "dropping undecodable forwarded call"),
            },
            other => tracing::debug!(trans_id = other, transit = %transit, "ignoring forwarded message"),
        }
    }
}

#[async_trait::async_trait]
impl Dispatcher for ServiceDispatcher {
    fn accepts(&self, env: &Envelope) -> bool {
        match env.msg_id() {
            msg_id::RPC_REQUEST | msg_id::ONE_WAY_RPC | msg_id::RPC_REPLY => true,
            msg_id::FORWARD => env
                .msg_ref::<MsgForward>()
                .is_some_and(|f| self.inner.service.in_domain(&f.dst)),
            _ => false,
        }
    }

    async fn dispatch(&self, env: Envelope) {
        let origin = env.head.origin.clone();
        match env.msg_id() {
            msg_id::RPC_REQUEST => {
                if let Some((_, req)) = env.into_msg::<MsgRpcRequest>() {
                    let to = ReplyTo::Direct(origin.addr.clone());
                    self.spawn_request(req, origin, to);
                }
            }
            msg_id::ONE_WAY_RPC => {
                if let Some((_, msg)) = env.into_msg::<MsgOneWayRpc>() {
                    self.spawn_one_way(msg, origin);
                }
            }
            msg_id::RPC_REPLY => {
                if let Some((_, reply)) = env.into_msg::<MsgRpcReply>() {
                    self.resolve(reply);
                }
            }
            msg_id::FORWARD => {
                if let Some((_, forward)) = env.into_msg::<MsgForward>() {
                    self.unwrap_forward(forward, origin);
                }
            }
            other => tracing::debug!(msg_id = other, "service dispatcher ignoring message"),
        }
    }
}
