//! Gate side of client-to-service traffic.
//!
//! A client frame is decoded, its call stamped with a single gate hop
//! `Call{gate, client address, gate node address}` (whatever chain the client
//! sent is discarded), wrapped in a `MsgForward` and sent to the service node
//! that hosts the target entity. The forward keeps the client's correlation
//! id; the service's answer comes back as a forward to the client and leaves
//! through `GateOutbound`.
//!
//! Target entity by category:
//!
//! | category | routed to the node hosting |
//! |----------|----------------------------|
//! | Entity   | `path.entity_id`           |
//! | Runtime  | `path.entity_id`           |
//! | Service  | the client's own entity    |
//! | Client   | rejected                   |

use std::sync::Arc;

use bytes::Bytes;

use tiderpc::Call;
use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::Category;
use tiderpc::Msg;
use tiderpc::MsgForward;
use tiderpc::MsgOneWayRpc;
use tiderpc::MsgRpcReply;
use tiderpc::MsgRpcRequest;
use tiderpc::msg_id;

use crate::error::CallError;
use crate::gate::ReplyOwners;
use crate::gate::session::SessionId;
use crate::gate::session::SessionRouter;
use crate::locator::EntityLocator;
use crate::net::Network;
use crate::pending::Futures;

/// Entry point for frames read off client sessions.
#[derive(Clone)]
pub struct GateInbound {
    net: Arc<Network>,
    sessions: Arc<dyn SessionRouter>,
    locator: Arc<dyn EntityLocator>,
    futures: Futures,
    owners: ReplyOwners,
    gate_service: String,
}

impl GateInbound {
    pub fn new(
        net: Arc<Network>,
        sessions: Arc<dyn SessionRouter>,
        locator: Arc<dyn EntityLocator>,
        futures: Futures,
        owners: ReplyOwners,
        gate_service: impl Into<String>,
    ) -> Self {
        Self {
            net,
            sessions,
            locator,
            futures,
            owners,
            gate_service: gate_service.into(),
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRouter> {
        &self.sessions
    }

    /// Handles one frame the client on `session_id` sent.
    ///
    /// A failed request is answered on the session itself; the returned
    /// error is for the caller's logs.
    pub async fn handle_client_frame(&self, session_id: SessionId, frame: Bytes) -> Result<(), CallError> {
        let (entity, client_addr) = self
            .sessions
            .lookup_entity(session_id)
            .ok_or_else(|| CallError::Unresolved(format!("session {}", session_id)))?;
        let env = self.net.codec().decode(frame)?;

        match env.msg_id() {
            msg_id::RPC_REQUEST => {
                let Some((_, mut request)) = env.into_msg::<MsgRpcRequest>() else {
                    return Err(CallError::Decode("request body".into()));
                };
                let corr_id = request.corr_id;
                let relayed = match self.route(&entity, &request.path).await {
                    Ok(node_addr) => {
                        request.call_chain = self.gate_chain(&client_addr);
                        self.relay(&node_addr, corr_id, &request).await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = &relayed {
                    self.answer_session(session_id, &entity, corr_id, e);
                }
                relayed
            }
            msg_id::ONE_WAY_RPC => {
                let Some((_, mut msg)) = env.into_msg::<MsgOneWayRpc>() else {
                    return Err(CallError::Decode("one-way body".into()));
                };
                let node_addr = self.route(&entity, &msg.path).await?;
                msg.call_chain = self.gate_chain(&client_addr);
                self.relay(&node_addr, 0, &msg).await
            }
            msg_id::RPC_REPLY => {
                let Some((_, reply)) = env.into_msg::<MsgRpcReply>() else {
                    return Err(CallError::Decode("reply body".into()));
                };
                match self.owners.get(&reply.corr_id).map(|owner| *owner) {
                    Some(owner) if owner == session_id => {}
                    Some(owner) => {
                        tracing::warn!(session = session_id, owner, corr_id = reply.corr_id, "dropping client reply from the wrong session");
                        return Err(CallError::PermissionDenied(format!(
                            "reply {} from session {}",
                            reply.corr_id, session_id
                        )));
                    }
                    None => {
                        tracing::debug!(session = session_id, corr_id = reply.corr_id, "client reply without a pending request");
                        return Ok(());
                    }
                }
                let ret = match reply.error {
                    Some(fault) => Err(CallError::from_fault(fault)),
                    None => Ok(reply.rets),
                };
                if let Err(e) = self.futures.resolve(reply.corr_id, ret) {
                    tracing::debug!(session = session_id, corr_id = reply.corr_id, error = %e, "client reply without a pending request");
                }
                Ok(())
            }
            other => Err(CallError::Decode(format!("unexpected message {} from client", other))),
        }
    }

    fn gate_chain(&self, client_addr: &str) -> CallChain {
        CallChain::from_calls(vec![Call::new(self.gate_service.as_str(), client_addr, self.net.addr())])
    }

    /// The unicast address of the service node that should run `path`.
    async fn route(&self, entity: &str, path: &str) -> Result<String, CallError> {
        let path = CallPath::parse(path)?;
        let target = match path.category {
            Category::Entity | Category::Runtime => path.entity_id.as_str(),
            Category::Service => entity,
            Category::Client => {
                return Err(CallError::InvalidPath(format!("client {} cannot call client path {}", entity, path)));
            }
        };
        let dist = self
            .locator
            .get_dist_entity(target)
            .await
            .ok_or_else(|| CallError::Unresolved(format!("entity {}", target)))?;
        dist.node_except(&self.gate_service)
            .map(|n| n.remote_addr.clone())
            .ok_or_else(|| CallError::Unresolved(format!("no service node hosts {}", target)))
    }

    async fn relay(&self, node_addr: &str, corr_id: i64, inner: &dyn Msg) -> Result<(), CallError> {
        let forward = MsgForward {
            transit: self.net.addr().to_string(),
            dst: node_addr.to_string(),
            corr_id,
            trans_id: inner.msg_id(),
            trans_data: self.net.codec().encode_body(inner)?,
        };
        self.net.send(node_addr, &forward).await
    }

    fn answer_session(&self, session_id: SessionId, entity: &str, corr_id: i64, error: &CallError) {
        let reply = MsgRpcReply { corr_id, rets: Vec::new(), error: Some(error.to_fault()) };
        let sent = self
            .net
            .codec()
            .encode(&self.net.origin(), 0, &reply)
            .map_err(CallError::from)
            .and_then(|frame| match self.sessions.lookup_session(entity) {
                Some(session) => session.try_send(frame).map_err(|e| CallError::Undeliverable(e.to_string())),
                None => Err(CallError::Unresolved(format!("session {}", session_id))),
            });
        if let Err(e) = sent {
            tracing::warn!(session = session_id, corr_id, error = %e, "failed to answer client");
        }
    }
}
