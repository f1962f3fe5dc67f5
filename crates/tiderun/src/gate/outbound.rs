//! Gate side of service-to-client traffic.
//!
//! Accepts `MsgForward`s whose `dst` is a client address and turns the inner
//! message back into a frame for the client's session.
//!
//! - **Unicast request**: the inner correlation id is swapped for a gate
//!   future, recorded against the session it is queued on. When that client
//!   answers (or the future times out) the reply is sent, with the original
//!   id, to the forward's transit address.
//! - **Unicast one-way / reply**: re-framed verbatim.
//! - **Multicast / broadcast**: the frame is queued on every member session.
//!   A full queue loses the frame for that member only.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tiderpc::CallPath;
use tiderpc::Envelope;
use tiderpc::MsgForward;
use tiderpc::MsgOneWayRpc;
use tiderpc::MsgRpcReply;
use tiderpc::MsgRpcRequest;
use tiderpc::msg_id;

use crate::address::AddrKind;
use crate::address::NodeDetails;
use crate::dispatcher::Dispatcher;
use crate::error::CallError;
use crate::gate::session::SessionError;
use crate::gate::ReplyOwners;
use crate::gate::session::SessionRouter;
use crate::net::Network;
use crate::pending::Futures;
use crate::pending::ResponseSink;
use crate::pending::Ret;

pub struct GateOutbound {
    net: Arc<Network>,
    sessions: Arc<dyn SessionRouter>,
    futures: Futures,
    owners: ReplyOwners,
    client: NodeDetails,
    timeout: Duration,
    ctx: CancellationToken,
}

impl GateOutbound {
    pub fn new(
        net: Arc<Network>,
        sessions: Arc<dyn SessionRouter>,
        futures: Futures,
        owners: ReplyOwners,
        client: NodeDetails,
        timeout: Duration,
        ctx: CancellationToken,
    ) -> Self {
        Self { net, sessions, futures, owners, client, timeout, ctx }
    }

    /// A sink that releases `gate_id` and answers the original requester
    /// through `transit`.
    fn reply_sink(&self, transit: String, corr_id: i64, gate_id: i64) -> ResponseSink {
        let net = self.net.clone();
        let owners = self.owners.clone();
        ResponseSink::callback(move |ret: Ret| {
            owners.remove(&gate_id);
            let reply = match ret {
                Ok(rets) => MsgRpcReply { corr_id, rets, error: None },
                Err(e) => MsgRpcReply { corr_id, rets: Vec::new(), error: Some(e.to_fault()) },
            };
            tokio::spawn(async move {
                if let Err(e) = net.send(&transit, &reply).await {
                    tracing::warn!(transit = %transit, corr_id, error = %e, "failed to return client reply");
                }
            });
        })
    }

    fn unicast(&self, forward: MsgForward) -> Result<(), CallError> {
        let entity = self.client.node_target(&forward.dst).unwrap_or_default();
        let session = self.sessions.lookup_session(entity);

        if forward.trans_id != msg_id::RPC_REQUEST {
            let session = session.ok_or_else(|| CallError::Unresolved(format!("no session for {}", forward.dst)))?;
            let frame = self.net.codec().encode_raw(&self.net.origin(), 0, forward.trans_id, &forward.trans_data)?;
            return session.try_send(frame).map_err(|e| CallError::Undeliverable(e.to_string()));
        }

        let MsgForward { transit, dst, corr_id, trans_id, trans_data } = forward;
        let mut request: MsgRpcRequest = self.net.codec().decode_body_as(trans_id, trans_data)?;
        let owner = session.as_ref().map(|s| s.id());
        let gate_id = self.futures.make_with(&self.ctx, self.timeout, |id| {
            if let Some(owner) = owner {
                self.owners.insert(id, owner);
            }
            self.reply_sink(transit, corr_id, id)
        });

        let Some(session) = session else {
            let _ = self.futures.resolve(gate_id, Err(CallError::Unresolved(format!("no session for {}", dst))));
            return Ok(());
        };

        request.corr_id = gate_id;
        let sent = self
            .net
            .codec()
            .encode(&self.net.origin(), 0, &request)
            .map_err(CallError::from)
            .and_then(|frame| session.try_send(frame).map_err(|e| CallError::Undeliverable(e.to_string())));
        if let Err(e) = sent {
            let _ = self.futures.resolve(gate_id, Err(e));
        }
        Ok(())
    }

    fn fan_out(&self, kind: AddrKind, forward: MsgForward) -> Result<(), CallError> {
        let members = match kind {
            AddrKind::Multicast => {
                let group = self.client.multicast_group(&forward.dst).unwrap_or_default();
                self.sessions.group_members(group)
            }
            _ => self.sessions.all_sessions(),
        };

        let skip = self.excluded_session(&forward);
        let frame = self.net.codec().encode_raw(&self.net.origin(), 0, forward.trans_id, &forward.trans_data)?;
        for member in members {
            if Some(member.id()) == skip {
                continue;
            }
            match member.try_send(frame.clone()) {
                Ok(()) => {}
                Err(SessionError::QueueFull) => {
                    tracing::warn!(session = member.id(), dst = %forward.dst, "send queue full, dropping frame");
                }
                Err(SessionError::Closed) => {
                    tracing::debug!(session = member.id(), dst = %forward.dst, "session closed during fan-out");
                }
            }
        }
        Ok(())
    }

    /// The originating client's session, when the inner call asks to skip it.
    fn excluded_session(&self, forward: &MsgForward) -> Option<u64> {
        if forward.trans_id != msg_id::ONE_WAY_RPC {
            return None;
        }
        let inner: MsgOneWayRpc = self
            .net
            .codec()
            .decode_body_as(forward.trans_id, forward.trans_data.clone())
            .ok()?;
        let path = CallPath::parse(&inner.path).ok()?;
        if !path.exclude_src {
            return None;
        }
        let origin = inner.call_chain.first()?;
        let entity = self.client.node_target(&origin.addr)?;
        self.sessions.lookup_session(entity).map(|s| s.id())
    }
}

#[async_trait::async_trait]
impl Dispatcher for GateOutbound {
    fn accepts(&self, env: &Envelope) -> bool {
        env.msg_id() == msg_id::FORWARD
            && env
                .msg_ref::<MsgForward>()
                .is_some_and(|f| self.client.in_domain(&f.dst))
    }

    async fn dispatch(&self, env: Envelope) {
        let Some((_, forward)) = env.into_msg::<MsgForward>() else {
            return;
        };
        let dst = forward.dst.clone();
        let trans_id = forward.trans_id;
        let result = match self.client.classify(&dst) {
            Some(AddrKind::Node) => self.unicast(forward),
            Some(kind @ (AddrKind::Multicast | AddrKind::Broadcast)) => self.fan_out(kind, forward),
            _ => Err(CallError::Undeliverable(dst.clone())),
        };
        if let Err(e) = result {
            tracing::warn!(dst = %dst, trans_id, error = %e, "dropping forward to client");
        }
    }
}
