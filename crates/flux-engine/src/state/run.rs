use std::collections::{BTreeMap, BTreeSet};

use flux_core::types::{EdgeId, FlowId, NodeId, RunId};

use super::path::Path;
use super::support::{Support, SupportSet};
use crate::flow::{Edge, Node};

/// One execution thread through one or more flows.
///
/// Calls into subflows stay in the same run; a run keeps one [`Path`] per
/// flow it has touched.
#[derive(Debug, Clone)]
pub struct FlowRun {
    id: RunId,
    start_nodes: Vec<NodeId>,
    ever_activated: BTreeSet<NodeId>,
    paths: BTreeMap<FlowId, Path>,
}

impl FlowRun {
    pub(crate) fn new(id: RunId, start_nodes: Vec<NodeId>) -> Self {
        Self {
            id,
            start_nodes,
            ever_activated: BTreeSet::new(),
            paths: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn start_nodes(&self) -> &[NodeId] {
        &self.start_nodes
    }

    /// Nodes activated at any point in this run; never shrinks.
    pub fn ever_activated(&self) -> &BTreeSet<NodeId> {
        &self.ever_activated
    }

    pub fn was_activated(&self, node: NodeId) -> bool {
        self.ever_activated.contains(&node)
    }

    pub fn is_active(&self, node: &Node) -> bool {
        self.path(node.flow())
            .is_some_and(|p| p.is_supported(node.id()))
    }

    pub fn is_active_id(&self, node: NodeId) -> bool {
        self.paths.values().any(|p| p.is_supported(node))
    }

    pub fn supports(&self, node: &Node) -> Option<&SupportSet> {
        self.path(node.flow())?.supports(node.id())
    }

    pub fn has_fired(&self, edge: &Edge) -> bool {
        self.path(edge.flow())
            .is_some_and(|p| p.has_fired(edge.id()))
    }

    pub fn has_fired_id(&self, edge: EdgeId) -> bool {
        self.paths.values().any(|p| p.has_fired(edge))
    }

    pub fn path(&self, flow: FlowId) -> Option<&Path> {
        self.paths.get(&flow)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.values()
    }

    pub fn active_nodes(&self) -> BTreeSet<NodeId> {
        self.paths.values().flat_map(|p| p.active_nodes()).collect()
    }

    pub fn fired_edges(&self) -> BTreeSet<EdgeId> {
        self.paths
            .values()
            .flat_map(|p| p.fired_edges().iter().copied())
            .collect()
    }

    fn path_mut(&mut self, flow: FlowId) -> &mut Path {
        self.paths.entry(flow).or_insert_with(|| Path::new(flow))
    }

    /// Returns false if the node was already activated in this run.
    pub(crate) fn mark_activated(&mut self, node: NodeId) -> bool {
        self.ever_activated.insert(node)
    }

    /// Returns true if the node was unsupported before.
    pub(crate) fn add_support(&mut self, node: &Node, support: Support) -> bool {
        self.path_mut(node.flow()).add_support(node.id(), support)
    }

    /// Returns true if the node is unsupported afterwards.
    pub(crate) fn remove_support(&mut self, node: &Node, support: &Support) -> bool {
        self.path_mut(node.flow()).remove_support(node.id(), support)
    }

    /// Fire `edge`: mark it and give its target the matching support.
    /// Returns true if the target was unsupported before.
    pub(crate) fn attach(&mut self, edge: &Edge) -> bool {
        let path = self.path_mut(edge.flow());
        path.set_fired(edge.id());
        path.add_support(edge.to(), Support::FromEdge(edge.id()))
    }

    /// Undo [`FlowRun::attach`]. Returns true if the target is unsupported afterwards.
    pub(crate) fn detach(&mut self, edge: &Edge) -> bool {
        let path = self.path_mut(edge.flow());
        path.clear_fired(edge.id());
        path.remove_support(edge.to(), &Support::FromEdge(edge.id()))
    }

    /// Drop every support of `node`, clearing the fired flags of the edges
    /// behind its `FromEdge` supports.
    pub(crate) fn clear_supports(&mut self, node: &Node) -> SupportSet {
        let path = self.path_mut(node.flow());
        let supports = path.take_supports(node.id());
        for edge in supports.edges() {
            path.clear_fired(edge);
        }
        supports
    }

    /// Replace all supports of `node` with a single `Permanent` one.
    pub(crate) fn make_permanent(&mut self, node: &Node) {
        self.clear_supports(node);
        self.add_support(node, Support::Permanent);
    }

    /// Make `node` an active, already-executed start node of this run.
    pub(crate) fn seed(&mut self, node: &Node) {
        self.mark_activated(node.id());
        self.add_support(node, Support::Permanent);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::flow::{Always, NodeKind};

    fn node(id: usize) -> Node {
        Node {
            id: NodeId(id),
            flow: FlowId(0),
            name: format!("n{id}"),
            kind: NodeKind::Start,
            incoming: vec![],
            outgoing: vec![],
        }
    }

    fn edge(id: usize, from: usize, to: usize) -> Edge {
        Edge {
            id: EdgeId(id),
            flow: FlowId(0),
            from: NodeId(from),
            to: NodeId(to),
            guard: Arc::new(Always),
        }
    }

    #[test]
    fn test_attach_keeps_fired_flag_and_support_in_step() {
        let mut run = FlowRun::new(RunId(1), vec![NodeId(0)]);
        let e = edge(0, 0, 1);
        assert!(run.attach(&e));
        assert!(run.has_fired(&e));
        assert!(run.is_active(&node(1)));
        assert!(run
            .supports(&node(1))
            .unwrap()
            .contains(&Support::FromEdge(EdgeId(0))));

        assert!(run.detach(&e));
        assert!(!run.has_fired(&e));
        assert!(!run.is_active(&node(1)));
    }

    #[test]
    fn test_clear_supports_clears_fired_edges() {
        let mut run = FlowRun::new(RunId(1), vec![]);
        let (e1, e2) = (edge(0, 0, 2), edge(1, 1, 2));
        run.attach(&e1);
        assert!(!run.attach(&e2));
        let removed = run.clear_supports(&node(2));
        assert_eq!(removed.len(), 2);
        assert!(!run.has_fired_id(EdgeId(0)));
        assert!(!run.has_fired_id(EdgeId(1)));
    }

    #[test]
    fn test_make_permanent_detaches_antecedents() {
        let mut run = FlowRun::new(RunId(1), vec![]);
        let e = edge(0, 0, 1);
        run.attach(&e);
        run.make_permanent(&node(1));
        assert!(!run.has_fired(&e));
        assert!(run.supports(&node(1)).unwrap().is_permanent());
        assert!(!run.detach(&e));
        assert!(run.is_active(&node(1)));
    }

    #[test]
    fn test_seed_counts_as_activated() {
        let mut run = FlowRun::new(RunId(1), vec![NodeId(3)]);
        run.seed(&node(3));
        assert!(run.was_activated(NodeId(3)));
        assert!(!run.mark_activated(NodeId(3)));
        assert_eq!(run.active_nodes().into_iter().collect::<Vec<_>>(), vec![NodeId(3)]);
    }
}
