//! Point-in-time view of the node pool for the metrics endpoint.

use serde::Serialize;

use loadstone_common::{HealthStatus, Node};

/// Per-node entry in the metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetrics {
    pub id: String,
    pub endpoint: String,
    pub health: HealthStatus,
    pub available: bool,
}

/// Pool-level counts plus the per-node breakdown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total: usize,
    pub available: usize,
    pub unavailable: usize,
    pub per_node: Vec<NodeMetrics>,
}

impl MetricsSnapshot {
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let per_node: Vec<NodeMetrics> = nodes
            .iter()
            .map(|node| NodeMetrics {
                id: node.id.clone(),
                endpoint: node.endpoint.to_url(),
                health: node.status,
                available: node.status.is_usable(),
            })
            .collect();
        let available = per_node.iter().filter(|n| n.available).count();
        Self {
            total: per_node.len(),
            available,
            unavailable: per_node.len() - available,
            per_node,
        }
    }
}
