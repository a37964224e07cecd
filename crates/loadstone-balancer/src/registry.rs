//! Concurrent node registry.
//!
//! The registry is the single writer of node health: the health checker and
//! the admin surface both go through it, and readers (the router) always see
//! whole `Node` records, never partial updates.

use std::collections::BTreeMap;
use std::time::SystemTime;

use tokio::sync::RwLock;

use loadstone_common::{HealthStatus, Node, NodeHealthChangedEvent};

/// Concurrent mapping from node id to [`Node`].
///
/// Backed by a `BTreeMap` so every snapshot comes out in the same id order
/// without sorting per call; the round-robin strategy relies on that stable
/// order for even distribution. Reads proceed in parallel, writes serialize
/// against each other.
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seeds the registry with a static node list.
    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Upserts by id, replacing any existing record atomically.
    pub async fn save(&self, node: Node) {
        let mut nodes = self.nodes.write().await;
        nodes.insert(node.id.clone(), node);
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Node> {
        let nodes = self.nodes.read().await;
        nodes.get(id).cloned()
    }

    /// Snapshot of all records at call time, in id order.
    pub async fn find_all(&self) -> Vec<Node> {
        let nodes = self.nodes.read().await;
        nodes.values().cloned().collect()
    }

    /// Snapshot of the nodes currently eligible for routing.
    pub async fn find_available(&self) -> Vec<Node> {
        let nodes = self.nodes.read().await;
        nodes
            .values()
            .filter(|node| node.status.is_usable())
            .cloned()
            .collect()
    }

    /// Removes a node, reporting whether it was present.
    pub async fn delete(&self, id: &str) -> bool {
        let mut nodes = self.nodes.write().await;
        nodes.remove(id).is_some()
    }

    pub async fn exists(&self, id: &str) -> bool {
        let nodes = self.nodes.read().await;
        nodes.contains_key(id)
    }

    /// Applies a health check result to a node.
    ///
    /// Returns an event iff the stored status actually changed. Unknown ids
    /// are ignored; the node may have been deleted while its probe was in
    /// flight.
    pub async fn update_health_status(
        &self,
        id: &str,
        status: HealthStatus,
        reason: &str,
    ) -> Option<NodeHealthChangedEvent> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.get_mut(id)?;
        let previous = node.status;
        if previous == status {
            return None;
        }
        node.status = status;
        Some(NodeHealthChangedEvent {
            node_id: node.id.clone(),
            previous,
            current: status,
            reason: reason.to_string(),
            occurred_at: SystemTime::now(),
        })
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
