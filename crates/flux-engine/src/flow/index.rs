use std::collections::HashMap;

use flux_core::types::{EdgeId, NodeId, ObjectId};

/// Reverse index from a fact to the edges whose guards read it and the
/// action nodes that recompute from it.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    edges: HashMap<ObjectId, Vec<EdgeId>>,
    nodes: HashMap<ObjectId, Vec<NodeId>>,
    /// Edges whose guards read flow state instead of facts.
    state_edges: Vec<EdgeId>,
}

impl DependencyIndex {
    pub fn edges_for(&self, object: &ObjectId) -> &[EdgeId] {
        self.edges.get(object).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes_for(&self, object: &ObjectId) -> &[NodeId] {
        self.nodes.get(object).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn state_edges(&self) -> &[EdgeId] {
        &self.state_edges
    }

    pub(crate) fn add_state_edge(&mut self, edge: EdgeId) {
        if !self.state_edges.contains(&edge) {
            self.state_edges.push(edge);
        }
    }

    pub(crate) fn add_edge(&mut self, object: ObjectId, edge: EdgeId) {
        let edges = self.edges.entry(object).or_default();
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    pub(crate) fn add_node(&mut self, object: ObjectId, node: NodeId) {
        let nodes = self.nodes.entry(object).or_default();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_deduplicated() {
        let mut index = DependencyIndex::default();
        index.add_edge("X".into(), EdgeId(1));
        index.add_edge("X".into(), EdgeId(1));
        index.add_edge("X".into(), EdgeId(4));
        index.add_node("X".into(), NodeId(2));
        assert_eq!(index.edges_for(&"X".into()), &[EdgeId(1), EdgeId(4)]);
        assert_eq!(index.nodes_for(&"X".into()), &[NodeId(2)]);
        assert!(index.edges_for(&"Y".into()).is_empty());
        index.add_state_edge(EdgeId(3));
        index.add_state_edge(EdgeId(3));
        assert_eq!(index.state_edges(), &[EdgeId(3)]);
    }
}
