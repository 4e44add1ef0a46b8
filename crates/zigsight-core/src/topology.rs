//! Mesh topology graph construction.
//!
//! Builds a node/edge view from the flat device map for visualization.
//! Nodes carry the analytics cached on each record; nothing is recomputed
//! here.

use indexmap::IndexMap;
use tracing::debug;

use zigsight_types::{
    BRIDGE_DEVICE_ID, DeviceRecord, NodeAnalytics, NodeType, NodeView, SYNTHETIC_COORDINATOR_ID,
    TopologyEdge, TopologyGraph,
};

/// Build the topology graph for the given devices.
///
/// Nodes appear in map order. The `"bridge"` entry is skipped, devices are
/// classified from the `type` attribute of their last message, and a
/// device declaring a `parent_ieee` gets an edge from that parent. Parent
/// ids are not checked against node ids (see
/// [`TopologyGraph::dangling_edges`]). When no device is a coordinator, one
/// is synthesized and placed first.
///
/// ```
/// use indexmap::IndexMap;
/// use zigsight_core::topology::build_topology;
///
/// let graph = build_topology(&IndexMap::new());
/// assert_eq!(graph.device_count, 1);
/// assert_eq!(graph.nodes[0].id, "coordinator");
/// assert!(graph.edges.is_empty());
/// ```
pub fn build_topology(devices: &IndexMap<String, DeviceRecord>) -> TopologyGraph {
    let mut nodes = Vec::with_capacity(devices.len() + 1);
    let mut edges = Vec::new();

    for (device_id, device) in devices {
        if device_id == BRIDGE_DEVICE_ID {
            continue;
        }

        let metrics = &device.metrics;
        let analytics = device.analytics.as_ref();

        nodes.push(NodeView {
            id: device_id.clone(),
            label: device.friendly_name.clone(),
            node_type: metrics.declared_node_type(),
            link_quality: metrics.link_quality,
            battery: metrics.battery,
            last_seen: metrics.last_seen,
            health_score: analytics.map(|a| a.health_score),
            analytics: analytics.map(NodeAnalytics::from).unwrap_or_default(),
        });

        if let Some(parent) = metrics.parent_ieee() {
            edges.push(TopologyEdge {
                from: parent.to_string(),
                to: device_id.clone(),
                link_quality: metrics.link_quality,
            });
        }
    }

    if !nodes.iter().any(|n| n.node_type == NodeType::Coordinator) {
        nodes.insert(0, synthetic_coordinator());
    }

    let count = |node_type: NodeType| nodes.iter().filter(|n| n.node_type == node_type).count();
    let coordinator_count = count(NodeType::Coordinator);
    let router_count = count(NodeType::Router);
    let end_device_count = count(NodeType::EndDevice);

    debug!(
        "Built topology with {} nodes and {} edges",
        nodes.len(),
        edges.len()
    );

    TopologyGraph {
        device_count: nodes.len(),
        coordinator_count,
        router_count,
        end_device_count,
        nodes,
        edges,
    }
}

fn synthetic_coordinator() -> NodeView {
    NodeView {
        id: SYNTHETIC_COORDINATOR_ID.to_string(),
        label: "Coordinator".to_string(),
        node_type: NodeType::Coordinator,
        link_quality: Some(255.0),
        battery: None,
        last_seen: None,
        health_score: Some(100.0),
        analytics: NodeAnalytics::default(),
    }
}
