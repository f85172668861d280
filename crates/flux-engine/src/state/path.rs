use std::collections::{BTreeSet, HashMap};

use flux_core::types::{EdgeId, FlowId, NodeId};

use super::support::{Support, SupportSet};

/// Mutable state of one flow inside one run: node supports and fired edges.
///
/// Mutators are crate-private; [`super::FlowRun`] keeps fired flags and
/// `FromEdge` supports in lock-step.
#[derive(Debug, Clone)]
pub struct Path {
    flow: FlowId,
    supports: HashMap<NodeId, SupportSet>,
    fired: BTreeSet<EdgeId>,
}

impl Path {
    pub(crate) fn new(flow: FlowId) -> Self {
        Self {
            flow,
            supports: HashMap::new(),
            fired: BTreeSet::new(),
        }
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn is_supported(&self, node: NodeId) -> bool {
        self.supports.get(&node).is_some_and(|s| !s.is_empty())
    }

    pub fn supports(&self, node: NodeId) -> Option<&SupportSet> {
        self.supports.get(&node).filter(|s| !s.is_empty())
    }

    pub fn has_fired(&self, edge: EdgeId) -> bool {
        self.fired.contains(&edge)
    }

    pub fn active_nodes(&self) -> BTreeSet<NodeId> {
        self.supports
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(n, _)| *n)
            .collect()
    }

    pub fn fired_edges(&self) -> &BTreeSet<EdgeId> {
        &self.fired
    }

    /// Returns true if the node was unsupported before.
    pub(crate) fn add_support(&mut self, node: NodeId, support: Support) -> bool {
        self.supports.entry(node).or_default().insert(support)
    }

    /// Returns true if the node is unsupported afterwards.
    pub(crate) fn remove_support(&mut self, node: NodeId, support: &Support) -> bool {
        let Some(set) = self.supports.get_mut(&node) else {
            return false;
        };
        if !set.remove(support) {
            return false;
        }
        if set.is_empty() {
            self.supports.remove(&node);
            return true;
        }
        false
    }

    pub(crate) fn take_supports(&mut self, node: NodeId) -> SupportSet {
        self.supports.remove(&node).unwrap_or_default()
    }

    pub(crate) fn set_fired(&mut self, edge: EdgeId) {
        self.fired.insert(edge);
    }

    pub(crate) fn clear_fired(&mut self, edge: EdgeId) -> bool {
        self.fired.remove(&edge)
    }
}
