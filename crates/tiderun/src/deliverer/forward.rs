//! Delivery to clients through the gates that hold their sessions.
//!
//! A client address is `client.nd.<entity>`. The entity locator tells which
//! gate node hosts that entity's session; the call is encoded, wrapped in a
//! `MsgForward` naming this node as transit, and sent to that gate. Group and
//! broadcast calls go to every gate, each fanning out to its own sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::Msg;
use tiderpc::MsgForward;
use tiderpc::MsgOneWayRpc;
use tiderpc::MsgRpcRequest;
use tiderpc::Value;

use crate::address::AddrKind;
use crate::address::NodeDetails;
use crate::deliverer::Deliverer;
use crate::error::CallError;
use crate::locator::DistNode;
use crate::locator::EntityLocator;
use crate::net::Network;
use crate::pending::AsyncRet;
use crate::pending::Futures;

pub struct ForwardDeliverer {
    net: Arc<Network>,
    futures: Futures,
    locator: Arc<dyn EntityLocator>,
    client: NodeDetails,
    service: NodeDetails,
    gate_service: String,
    timeout: Duration,
}

impl ForwardDeliverer {
    pub fn new(
        net: Arc<Network>,
        futures: Futures,
        locator: Arc<dyn EntityLocator>,
        client: NodeDetails,
        service: NodeDetails,
        gate_service: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            net,
            futures,
            locator,
            client,
            service,
            gate_service: gate_service.into(),
            timeout,
        }
    }

    /// The gate node holding the session of the client at `dst`.
    async fn gate_of(&self, dst: &str) -> Result<DistNode, CallError> {
        let entity = self
            .client
            .node_target(dst)
            .ok_or_else(|| CallError::Undeliverable(format!("{} is not a client node address", dst)))?;
        let dist = self
            .locator
            .get_dist_entity(entity)
            .await
            .ok_or_else(|| CallError::Unresolved(format!("entity {}", entity)))?;
        dist.node_of(&self.gate_service)
            .cloned()
            .ok_or_else(|| CallError::Unresolved(format!("no {} node for entity {}", self.gate_service, entity)))
    }

    fn wrap(&self, dst: &str, corr_id: i64, inner: &dyn Msg) -> Result<MsgForward, CallError> {
        Ok(MsgForward {
            transit: self.net.addr().to_string(),
            dst: dst.to_string(),
            corr_id,
            trans_id: inner.msg_id(),
            trans_data: self.net.codec().encode_body(inner)?,
        })
    }

    async fn forward_request(
        &self,
        dst: &str,
        corr_id: i64,
        chain: CallChain,
        path: String,
        args: Vec<Value>,
    ) -> Result<(), CallError> {
        let gate = self.gate_of(dst).await?;
        let inner = MsgRpcRequest { corr_id, call_chain: chain, path, args };
        let forward = self.wrap(dst, corr_id, &inner)?;
        self.net.send(&gate.remote_addr, &forward).await
    }
}

#[async_trait::async_trait]
impl Deliverer for ForwardDeliverer {
    fn matches(&self, dst: &str, _chain: &CallChain, _path: &CallPath, one_way: bool) -> bool {
        match self.client.classify(dst) {
            Some(AddrKind::Node) => true,
            Some(AddrKind::Broadcast | AddrKind::Multicast) => one_way,
            _ => false,
        }
    }

    async fn request(
        &self,
        ctx: &CancellationToken,
        dst: &str,
        chain: CallChain,
        path: &CallPath,
        args: Vec<Value>,
    ) -> AsyncRet {
        let path = match path.encode() {
            Ok(path) => path,
            Err(e) => return AsyncRet::ready(Err(e.into())),
        };

        let (corr_id, ret) = self.futures.request(ctx, self.timeout);
        if let Err(e) = self.forward_request(dst, corr_id, chain, path, args).await {
            let _ = self.futures.resolve(corr_id, Err(e));
        }
        ret
    }

    async fn notify(&self, dst: &str, chain: CallChain, path: &CallPath, args: Vec<Value>) -> Result<(), CallError> {
        let inner = MsgOneWayRpc { call_chain: chain, path: path.encode()?, args };
        let forward = self.wrap(dst, 0, &inner)?;
        match self.client.classify(dst) {
            Some(AddrKind::Node) => {
                let gate = self.gate_of(dst).await?;
                self.net.send(&gate.remote_addr, &forward).await
            }
            _ => {
                let gates = self.service.broadcast_addr(&self.gate_service);
                self.net.send(&gates, &forward).await
            }
        }
    }
}
