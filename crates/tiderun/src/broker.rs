//! # Broker Abstraction
//!
//! The publish/subscribe transport, consumed through a minimal async seam.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The broker knows nothing about envelopes or messages.
//!   It moves opaque frames between topics.
//! - **Pull Subscriptions**: a subscription is a channel of deliveries that a
//!   pump task drains. Dropping the `Subscription` unsubscribes.
//! - **Declared Reliability**: the broker reports its delivery guarantee, and
//!   that alone decides whether the deduplication sequencer is engaged.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Errors at the broker layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker has been shut down.
    Closed,
    /// The topic or pattern is not acceptable to the broker.
    InvalidTopic(String),
    /// Generic I/O or internal broker failure.
    Io(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Broker closed"),
            Self::InvalidTopic(t) => write!(f, "Invalid topic: {:?}", t),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<BrokerError> for crate::error::CallError {
    fn from(e: BrokerError) -> Self {
        Self::Broker(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

/// The delivery guarantee a broker offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryReliability {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
    /// At-least-once on the wire, made exactly-once by the receiver.
    EffectivelyOnce,
}

impl DeliveryReliability {
    /// Whether frames must be sequenced and filtered on receipt.
    pub fn needs_dedup(self) -> bool {
        matches!(self, Self::AtLeastOnce | Self::EffectivelyOnce)
    }
}

/// One frame received on a subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub data: Bytes,
}

/// A live subscription. Deliveries arrive in publish order.
#[derive(Debug)]
pub struct Subscription {
    pattern: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(pattern: impl Into<String>, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { pattern: pattern.into(), rx }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Waits for the next delivery; `None` once the broker dropped the stream.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// A publish/subscribe transport.
///
/// This trait is designed to be object-safe (`Arc<dyn Broker>`).
#[async_trait::async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Publishes `data` on `topic`. Publishing to a topic nobody listens on
    /// is not an error.
    async fn publish(&self, topic: &str, data: Bytes) -> Result<()>;

    /// Subscribes to `pattern`. Subscribers sharing a `queue` name split the
    /// traffic between them, each frame going to exactly one member.
    async fn subscribe(&self, pattern: &str, queue: Option<&str>) -> Result<Subscription>;

    fn reliability(&self) -> DeliveryReliability;
}
