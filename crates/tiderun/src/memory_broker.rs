//! In-process broker for tests and single-process deployments.
//!
//! Topics are token paths split on a separator (`.` by default). Patterns
//! support `*` for exactly one token and a trailing `>` for one or more.
//! Queue groups receive each frame once, rotating between members.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::broker::Broker;
use crate::broker::BrokerError;
use crate::broker::Delivery;
use crate::broker::DeliveryReliability;
use crate::broker::Result;
use crate::broker::Subscription;

struct Subscriber {
    pattern: Vec<String>,
    queue: Option<String>,
    tx: mpsc::UnboundedSender<Delivery>,
}

pub struct MemoryBroker {
    separator: char,
    reliability: DeliveryReliability,
    duplicate: AtomicBool,
    closed: AtomicBool,
    subs: DashMap<u64, Subscriber>,
    next_id: AtomicU64,
    cursors: DashMap<String, usize>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// An exactly-once broker with `.` separated topics.
    pub fn new() -> Self {
        Self {
            separator: '.',
            reliability: DeliveryReliability::ExactlyOnce,
            duplicate: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            subs: DashMap::new(),
            next_id: AtomicU64::new(1),
            cursors: DashMap::new(),
        }
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_reliability(mut self, reliability: DeliveryReliability) -> Self {
        self.reliability = reliability;
        self
    }

    /// Delivers every frame twice, the way an at-least-once broker may
    /// after a lost acknowledgement.
    pub fn set_duplicate_delivery(&self, on: bool) {
        self.duplicate.store(on, Ordering::Relaxed);
    }

    /// Closes every subscription and rejects further use.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.subs.clear();
    }

    /// Number of live subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.subs.iter().filter(|s| !s.tx.is_closed()).count()
    }

    fn tokens(&self, s: &str) -> Vec<String> {
        s.split(self.separator).map(str::to_string).collect()
    }

    fn check(&self, topic: &str) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(BrokerError::Closed);
        }
        if topic.is_empty() || topic.split(self.separator).any(str::is_empty) {
            return Err(BrokerError::InvalidTopic(topic.to_string()));
        }
        Ok(())
    }

    fn next_in_group(&self, group: &str, members: usize) -> usize {
        let mut cursor = self.cursors.entry(group.to_string()).or_insert(0);
        let pick = *cursor % members;
        *cursor += 1;
        pick
    }
}

/// Token-wise NATS-style matching.
fn pattern_matches(pattern: &[String], topic: &[&str]) -> bool {
    let mut i = 0;
    for (pi, p) in pattern.iter().enumerate() {
        if p == ">" {
            return pi == pattern.len() - 1 && topic.len() > i;
        }
        match topic.get(i) {
            Some(t) if p == "*" || p == t => i += 1,
            _ => return false,
        }
    }
    i == topic.len()
}

#[async_trait::async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<()> {
        self.check(topic)?;
        let topic_tokens: Vec<&str> = topic.split(self.separator).collect();

        let mut direct = Vec::new();
        let mut groups: Vec<(String, Vec<(u64, mpsc::UnboundedSender<Delivery>)>)> = Vec::new();
        let mut dead = Vec::new();

        for sub in self.subs.iter() {
            if sub.tx.is_closed() {
                dead.push(*sub.key());
                continue;
            }
            if !pattern_matches(&sub.pattern, &topic_tokens) {
                continue;
            }
            match &sub.queue {
                None => direct.push(sub.tx.clone()),
                Some(q) => match groups.iter_mut().find(|(name, _)| name == q) {
                    Some((_, members)) => members.push((*sub.key(), sub.tx.clone())),
                    None => groups.push((q.clone(), vec![(*sub.key(), sub.tx.clone())])),
                },
            }
        }

        for id in dead {
            self.subs.remove(&id);
        }

        for (name, mut members) in groups {
            members.sort_unstable_by_key(|(id, _)| *id);
            let pick = self.next_in_group(&name, members.len());
            direct.push(members.swap_remove(pick).1);
        }

        let copies = if self.duplicate.load(Ordering::Relaxed) { 2 } else { 1 };
        for tx in direct {
            for _ in 0..copies {
                // A receiver dropped since the scan is pruned on the next publish.
                let _ = tx.send(Delivery { topic: topic.to_string(), data: data.clone() });
            }
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, queue: Option<&str>) -> Result<Subscription> {
        self.check(pattern)?;
        let tokens = self.tokens(pattern);
        if tokens.iter().take(tokens.len() - 1).any(|t| t == ">") {
            return Err(BrokerError::InvalidTopic(pattern.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs.insert(id, Subscriber {
            pattern: tokens,
            queue: queue.map(str::to_string),
            tx,
        });
        Ok(Subscription::new(pattern, rx))
    }

    fn reliability(&self) -> DeliveryReliability {
        self.reliability
    }
}
