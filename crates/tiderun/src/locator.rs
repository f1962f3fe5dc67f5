//! # Entity Locator
//!
//! The distributed-entity index: which service nodes currently host an entity.
//! Consumed through `EntityLocator`; `MemoryLocator` is the in-process index.

use dashmap::DashMap;

use crate::address::NodeDetails;

/// One service node hosting part of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistNode {
    pub service: String,
    /// Unicast address of the node.
    pub remote_addr: String,
    /// Load-balanced address of the node's service.
    pub balance_addr: String,
    /// Broadcast address of the node's service.
    pub broadcast_addr: String,
}

impl DistNode {
    /// Derives all three addresses of `service`/`node_id` from the service domain.
    pub fn new(details: &NodeDetails, service: &str, node_id: &str) -> Self {
        Self {
            service: service.to_string(),
            remote_addr: details.node_addr(service, node_id),
            balance_addr: details.balance_addr(service),
            broadcast_addr: details.broadcast_addr(service),
        }
    }
}

/// An entity and the nodes hosting it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistEntity {
    pub id: String,
    pub nodes: Vec<DistNode>,
}

impl DistEntity {
    /// The hosting node of `service`, if any.
    pub fn node_of(&self, service: &str) -> Option<&DistNode> {
        self.nodes.iter().find(|n| n.service == service)
    }

    /// The first hosting node that is not a `service` node.
    pub fn node_except(&self, service: &str) -> Option<&DistNode> {
        self.nodes.iter().find(|n| n.service != service)
    }
}

/// Given an entity id, return where it lives.
#[async_trait::async_trait]
pub trait EntityLocator: Send + Sync + 'static {
    async fn get_dist_entity(&self, entity_id: &str) -> Option<DistEntity>;
}

#[derive(Debug, Default)]
pub struct MemoryLocator {
    entities: DashMap<String, DistEntity>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `node` hosts `entity_id`, replacing any earlier node of
    /// the same service.
    pub fn add_node(&self, entity_id: &str, node: DistNode) {
        let mut entity = self.entities.entry(entity_id.to_string()).or_insert_with(|| DistEntity {
            id: entity_id.to_string(),
            nodes: Vec::new(),
        });
        entity.nodes.retain(|n| n.service != node.service);
        entity.nodes.push(node);
    }

    pub fn remove_node(&self, entity_id: &str, service: &str) {
        if let Some(mut entity) = self.entities.get_mut(entity_id) {
            entity.nodes.retain(|n| n.service != service);
        }
        self.entities.remove_if(entity_id, |_, e| e.nodes.is_empty());
    }

    pub fn remove_entity(&self, entity_id: &str) {
        self.entities.remove(entity_id);
    }
}

#[async_trait::async_trait]
impl EntityLocator for MemoryLocator {
    async fn get_dist_entity(&self, entity_id: &str) -> Option<DistEntity> {
        self.entities.get(entity_id).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_replace_remove() {
        let details = NodeDetails::new("service", '.');
        let locator = MemoryLocator::new();
        locator.add_node("e1", DistNode::new(&details, "gate", "g1"));
        locator.add_node("e1", DistNode::new(&details, "game", "n1"));
        locator.add_node("e1", DistNode::new(&details, "game", "n2"));

        let e1 = locator.get_dist_entity("e1").await.unwrap();
        assert_eq!(e1.nodes.len(), 2);
        assert_eq!(e1.node_of("game").unwrap().remote_addr, "service.nd.game.n2");
        assert_eq!(e1.node_except("gate").unwrap().service, "game");

        locator.remove_node("e1", "game");
        locator.remove_node("e1", "gate");
        assert!(locator.get_dist_entity("e1").await.is_none());
    }
}
