//! # Network
//!
//! The node's single path onto the broker: envelope encoding on the way out,
//! and per-subscription pumps that decode, deduplicate and dispatch on the
//! way in.
//!
//! ## Architecture
//!
//! ```text
//! send(dst, msg) ──lock──> seq ──> Codec::encode ──> Broker::publish
//!
//! Subscription ──> pump ──> decode ──> dedup ──> first accepting Dispatcher
//! ```
//!
//! ## Invariants
//! - **Ordered Sequencing**: when the broker needs deduplication, the sequence
//!   number is taken and the frame published while holding the send lock, so
//!   numbers reach the broker in increasing order.
//! - **Receive Order**: a pump awaits each `Dispatcher::dispatch` before
//!   reading the next delivery. Dispatchers push slow work onto their own
//!   tasks; they do not block the pump.
//! - Frames that fail to decode are logged and dropped; there is nobody to
//!   answer.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tiderpc::Codec;
use tiderpc::Msg;
use tiderpc::Origin;

use crate::broker::Broker;
use crate::broker::Delivery;
use crate::broker::Subscription;
use crate::dedup::DedupWindow;
use crate::dedup::SeqGen;
use crate::dispatcher::Dispatcher;
use crate::error::CallError;

/// The ordered inbound pipeline shared by every pump of a node.
pub type Dispatchers = Arc<[Arc<dyn Dispatcher>]>;

pub struct Network {
    broker: Arc<dyn Broker>,
    codec: Codec,
    svc: String,
    addr: String,
    seq: SeqGen,
    send_lock: Mutex<()>,
    dedup: bool,
}

impl Network {
    /// `svc` and `addr` are stamped as the origin of every frame sent.
    pub fn new(broker: Arc<dyn Broker>, codec: Codec, svc: impl Into<String>, addr: impl Into<String>) -> Self {
        let dedup = broker.reliability().needs_dedup();
        Self {
            broker,
            codec,
            svc: svc.into(),
            addr: addr.into(),
            seq: SeqGen::new(),
            send_lock: Mutex::new(()),
            dedup,
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn svc(&self) -> &str {
        &self.svc
    }

    /// This node's unicast address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// A fresh origin for frames leaving this node.
    pub fn origin(&self) -> Origin {
        Origin::now(self.svc.as_str(), self.addr.as_str())
    }

    /// Whether inbound frames are filtered through a dedup window.
    pub fn dedup_enabled(&self) -> bool {
        self.dedup
    }

    /// Encodes `msg` and publishes it to `dst`.
    pub async fn send(&self, dst: &str, msg: &dyn Msg) -> Result<(), CallError> {
        if !self.dedup {
            let frame = self.codec.encode(&self.origin(), 0, msg)?;
            return Ok(self.broker.publish(dst, frame).await?);
        }

        let _guard = self.send_lock.lock().await;
        let frame = self.codec.encode(&self.origin(), self.seq.next(), msg)?;
        self.broker.publish(dst, frame).await?;
        Ok(())
    }

    pub async fn subscribe(&self, pattern: &str, queue: Option<&str>) -> Result<Subscription, CallError> {
        Ok(self.broker.subscribe(pattern, queue).await?)
    }

    /// Spawns the pump for `sub`. It runs until `cancel` fires or the broker
    /// ends the subscription.
    pub fn serve(self: &Arc<Self>, mut sub: Subscription, dispatchers: Dispatchers, cancel: CancellationToken) -> JoinHandle<()> {
        let net = self.clone();
        tokio::spawn(async move {
            let window = DedupWindow::new();
            loop {
                let delivery = tokio::select! {
                    _ = cancel.cancelled() => break,
                    delivery = sub.recv() => match delivery {
                        Some(delivery) => delivery,
                        None => break,
                    },
                };
                net.handle(&window, &dispatchers, delivery).await;
            }
            tracing::debug!(pattern = sub.pattern(), "subscription pump stopped");
        })
    }

    async fn handle(&self, window: &DedupWindow, dispatchers: &[Arc<dyn Dispatcher>], delivery: Delivery) {
        let Delivery { topic, data } = delivery;
        let env = match self.codec.decode(data) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "dropping undecodable frame");
                return;
            }
        };

        if self.dedup && env.head.seq != 0 && !window.accept(&env.head.origin.addr, env.head.seq) {
            tracing::debug!(
                topic = %topic,
                remote = %env.head.origin.addr,
                seq = env.head.seq,
                "dropping duplicate frame"
            );
            return;
        }

        match dispatchers.iter().find(|d| d.accepts(&env)) {
            Some(dispatcher) => dispatcher.dispatch(env).await,
            None => tracing::debug!(topic = %topic, msg_id = env.msg_id(), "no dispatcher accepts frame"),
        }
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("svc", &self.svc)
            .field("addr", &self.addr)
            .field("dedup", &self.dedup)
            .finish()
    }
}
