use std::collections::HashMap;

use crate::error::LookupError;
use crate::models::NodeInfo;

/// Lookup of nodes known to the scheduler in the current cycle.
pub trait NodeInfoLister: Send + Sync {
    fn get(&self, node_name: &str) -> Result<NodeInfo, LookupError>;
    fn list(&self) -> Vec<NodeInfo>;
}

/// Capabilities the framework hands to a plugin at construction time.
pub trait FrameworkHandle: Send + Sync {
    fn node_infos(&self) -> &dyn NodeInfoLister;
}

/// A point-in-time view of the cluster nodes.
#[derive(Clone, Default)]
pub struct Snapshot {
    nodes: HashMap<String, NodeInfo>,
}

impl Snapshot {
    pub fn new(nodes: impl IntoIterator<Item = NodeInfo>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.name.clone(), n)).collect(),
        }
    }

    pub fn update_node(&mut self, node: NodeInfo) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn remove_node(&mut self, node_name: &str) {
        self.nodes.remove(node_name);
    }
}

impl NodeInfoLister for Snapshot {
    fn get(&self, node_name: &str) -> Result<NodeInfo, LookupError> {
        self.nodes
            .get(node_name)
            .cloned()
            .ok_or_else(|| LookupError::NodeNotFound(node_name.to_string()))
    }

    fn list(&self) -> Vec<NodeInfo> {
        self.nodes.values().cloned().collect()
    }
}

impl FrameworkHandle for Snapshot {
    fn node_infos(&self) -> &dyn NodeInfoLister {
        self
    }
}
