//! Shared fixtures for the tiderun integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use tiderpc::Codec;
use tiderpc::Envelope;
use tiderpc::MsgRegistry;
use tiderun::MemoryBroker;
use tiderun::MemoryLocator;
use tiderun::Node;
use tiderun::NodeBuilder;
use tiderun::RpcConfig;

/// Installs a fmt subscriber honouring `RUST_LOG`; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// One broker and one entity index shared by every node of a test.
pub struct Cluster {
    pub broker: Arc<MemoryBroker>,
    pub locator: Arc<MemoryLocator>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::with_broker(MemoryBroker::new())
    }

    pub fn with_broker(broker: MemoryBroker) -> Self {
        init_tracing();
        Self {
            broker: Arc::new(broker),
            locator: Arc::new(MemoryLocator::new()),
        }
    }

    pub fn builder(&self, service: &str, node_id: &str) -> NodeBuilder {
        NodeBuilder::new(service, node_id)
            .broker(self.broker.clone())
            .locator(self.locator.clone())
            .config(RpcConfig::default().with_request_timeout(Duration::from_secs(2)))
    }

    /// Builds and starts a node.
    pub async fn start(&self, builder: NodeBuilder) -> Node {
        let node = builder.build().expect("node builds");
        node.start().await.expect("node starts");
        node
    }
}

pub fn codec() -> Codec {
    Codec::new(Arc::new(MsgRegistry::with_builtins()))
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Next frame queued for a session, decoded.
pub async fn next_frame(rx: &mut mpsc::Receiver<Bytes>) -> Envelope {
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("frame in time")
        .expect("session open");
    codec().decode(frame).expect("frame decodes")
}

/// Asserts nothing arrives on the session for a short while.
pub async fn assert_silent(rx: &mut mpsc::Receiver<Bytes>) {
    let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(got.is_err(), "unexpected frame: {:?}", got);
}
