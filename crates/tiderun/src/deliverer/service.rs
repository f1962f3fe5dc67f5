//! Delivery inside the service domain.
//!
//! One-way calls may go to any service address: broadcast, balance, node or
//! multicast. Requests need exactly one responder, so only balance and node
//! addresses match.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::MsgOneWayRpc;
use tiderpc::MsgRpcRequest;
use tiderpc::Value;

use crate::address::AddrKind;
use crate::address::NodeDetails;
use crate::deliverer::Deliverer;
use crate::error::CallError;
use crate::net::Network;
use crate::pending::AsyncRet;
use crate::pending::Futures;

pub struct ServiceDeliverer {
    net: Arc<Network>,
    futures: Futures,
    service: NodeDetails,
    timeout: Duration,
}

impl ServiceDeliverer {
    pub fn new(net: Arc<Network>, futures: Futures, service: NodeDetails, timeout: Duration) -> Self {
        Self { net, futures, service, timeout }
    }
}

#[async_trait::async_trait]
impl Deliverer for ServiceDeliverer {
    fn matches(&self, dst: &str, _chain: &CallChain, _path: &CallPath, one_way: bool) -> bool {
        match self.service.classify(dst) {
            Some(AddrKind::Balance | AddrKind::Node) => true,
            Some(AddrKind::Broadcast | AddrKind::Multicast) => one_way,
            None => false,
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
        let msg = MsgRpcRequest { corr_id, call_chain: chain, path, args };
        if let Err(e) = self.net.send(dst, &msg).await {
            let _ = self.futures.resolve(corr_id, Err(e));
        }
        ret
    }

    async fn notify(&self, dst: &str, chain: CallChain, path: &CallPath, args: Vec<Value>) -> Result<(), CallError> {
        let msg = MsgOneWayRpc { call_chain: chain, path: path.encode()?, args };
        self.net.send(dst, &msg).await
    }
}
