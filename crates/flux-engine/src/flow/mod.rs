//! Immutable flow graph shared by every session.
//!
//! Nodes and edges of all flows live in two arenas owned by the [`FlowSet`]
//! and are addressed by [`NodeId`]/[`EdgeId`]. Nothing in here is mutated
//! once [`FlowSetBuilder::build`] returns; per-session state is kept in
//! [`crate::state`].

pub mod action;
pub mod builder;
pub mod condition;
pub mod edge;
pub mod index;
pub mod node;

use std::collections::{BTreeSet, HashMap};

use tracing::error;

use flux_core::error::{FluxError, Result};
use flux_core::types::{EdgeId, FlowId, NodeId};

pub use action::{CopyFact, NodeAction, SetFact};
pub use builder::{FlowBuilder, FlowSetBuilder};
pub use condition::{
    Always, And, Condition, EvalContext, FactEquals, FactKnown, FlowProcessed, NodeActive, Not,
    Or, Truth,
};
pub use edge::Edge;
pub use index::DependencyIndex;
pub use node::{CallSite, Node, NodeKind};

/// One named flowchart.
#[derive(Debug)]
pub struct Flow {
    pub(crate) id: FlowId,
    pub(crate) name: String,
    pub(crate) autostart: bool,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) edges: Vec<EdgeId>,
    pub(crate) start_nodes: Vec<NodeId>,
    pub(crate) exit_nodes: Vec<NodeId>,
}

impl Flow {
    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a run is seeded for this flow when a session opens.
    pub fn is_autostart(&self) -> bool {
        self.autostart
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn start_nodes(&self) -> &[NodeId] {
        &self.start_nodes
    }

    pub fn exit_nodes(&self) -> &[NodeId] {
        &self.exit_nodes
    }
}

/// All flows of a knowledge base plus the reverse dependency index.
#[derive(Debug)]
pub struct FlowSet {
    pub(crate) flows: Vec<Flow>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) index: DependencyIndex,
    /// Composed nodes keyed by the flow they call.
    pub(crate) callers: HashMap<FlowId, Vec<NodeId>>,
}

impl FlowSet {
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Panics if `id` was not issued by this flow set.
    pub fn flow(&self, id: FlowId) -> &Flow {
        &self.flows[id.0]
    }

    /// Panics if `id` was not issued by this flow set.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Panics if `id` was not issued by this flow set.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn try_node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(FluxError::UnknownNode(id))
    }

    pub fn try_edge(&self, id: EdgeId) -> Result<&Edge> {
        self.edges.get(id.0).ok_or(FluxError::UnknownEdge(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    /// Look up a flow by name, logging a miss.
    pub fn find_flow(&self, name: &str) -> Option<&Flow> {
        let found = self.flows.iter().find(|f| f.name == name);
        if found.is_none() {
            error!(flow = name, "Flow not found");
        }
        found
    }

    /// Look up any node of a flow by name.
    pub fn find_node(&self, flow: &str, node: &str) -> Option<NodeId> {
        let f = self.find_flow(flow)?;
        let found = self.named_in(&f.nodes, node);
        if found.is_none() {
            error!(flow, node, "Node not found");
        }
        found
    }

    pub fn find_start_node(&self, flow: &str, start: &str) -> Option<NodeId> {
        let f = self.find_flow(flow)?;
        let found = self.named_in(&f.start_nodes, start);
        if found.is_none() {
            error!(flow, start, "Start node not found");
        }
        found
    }

    pub fn find_exit_node(&self, flow: &str, exit: &str) -> Option<NodeId> {
        let f = self.find_flow(flow)?;
        let found = self.named_in(&f.exit_nodes, exit);
        if found.is_none() {
            error!(flow, exit, "Exit node not found");
        }
        found
    }

    fn named_in(&self, candidates: &[NodeId], name: &str) -> Option<NodeId> {
        candidates
            .iter()
            .copied()
            .find(|id| self.node(*id).name() == name)
    }

    /// Start nodes of every autostart flow, in flow order.
    pub fn autostart_nodes(&self) -> Vec<NodeId> {
        self.flows
            .iter()
            .filter(|f| f.autostart)
            .flat_map(|f| f.start_nodes.iter().copied())
            .collect()
    }

    /// Composed nodes that call into `flow`.
    pub fn calling_nodes(&self, flow: FlowId) -> &[NodeId] {
        self.callers.get(&flow).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes reachable from `from` by following edges inside its flow,
    /// `from` included.
    pub fn reachable_nodes(&self, from: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            for edge in self.node(id).outgoing() {
                stack.push(self.edge(*edge).to());
            }
        }
        seen
    }

    /// True if `to` can be reached from `from` inside one flow.
    pub fn are_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.reachable_nodes(from).contains(&to)
    }
}
