use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use flux_core::error::{FluxError, Result};
use flux_core::types::{EdgeId, FlowId, NodeId};

use super::action::NodeAction;
use super::condition::{Always, Condition};
use super::edge::Edge;
use super::index::DependencyIndex;
use super::node::{CallSite, Node, NodeKind};
use super::{Flow, FlowSet};

/// Describes one flow by node names. Nothing is resolved until
/// [`FlowSetBuilder::build`].
#[derive(Debug)]
pub struct FlowBuilder {
    name: String,
    autostart: bool,
    nodes: Vec<(String, NodeKind)>,
    edges: Vec<(String, String, Arc<dyn Condition>)>,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            autostart: false,
            nodes: vec![],
            edges: vec![],
        }
    }

    /// Seed a run for this flow when a session opens.
    pub fn autostart(mut self) -> Self {
        self.autostart = true;
        self
    }

    pub fn start(self, name: impl Into<String>) -> Self {
        self.node(name, NodeKind::Start)
    }

    pub fn exit(self, name: impl Into<String>) -> Self {
        self.node(name, NodeKind::Exit)
    }

    pub fn action(self, name: impl Into<String>, action: impl NodeAction + 'static) -> Self {
        self.node(name, NodeKind::Action(Arc::new(action)))
    }

    /// A node calling `start` of flow `flow`.
    pub fn composed(
        self,
        name: impl Into<String>,
        flow: impl Into<String>,
        start: impl Into<String>,
    ) -> Self {
        self.node(name, NodeKind::Composed(CallSite::new(flow, start)))
    }

    pub fn snapshot(self, name: impl Into<String>) -> Self {
        self.node(name, NodeKind::Snapshot)
    }

    pub fn node(mut self, name: impl Into<String>, kind: NodeKind) -> Self {
        self.nodes.push((name.into(), kind));
        self
    }

    pub fn edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        guard: impl Condition + 'static,
    ) -> Self {
        self.edges.push((from.into(), to.into(), Arc::new(guard)));
        self
    }

    /// Unconditional edge.
    pub fn always(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edge(from, to, Always)
    }
}

/// Assembles flows into a [`FlowSet`] and checks their consistency.
#[derive(Debug)]
pub struct FlowSetBuilder {
    flows: Vec<FlowBuilder>,
    check_consistency: bool,
}

impl Default for FlowSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowSetBuilder {
    pub fn new() -> Self {
        Self {
            flows: vec![],
            check_consistency: true,
        }
    }

    /// When disabled, unresolved call-sites are logged instead of rejected.
    pub fn with_consistency_check(mut self, enabled: bool) -> Self {
        self.check_consistency = enabled;
        self
    }

    pub fn add(mut self, flow: FlowBuilder) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn build(self) -> Result<FlowSet> {
        let mut set = FlowSet {
            flows: Vec::with_capacity(self.flows.len()),
            nodes: vec![],
            edges: vec![],
            index: DependencyIndex::default(),
            callers: HashMap::new(),
        };

        for spec in self.flows {
            if set.flows.iter().any(|f| f.name == spec.name) {
                return Err(FluxError::DuplicateFlow(spec.name));
            }
            add_flow(&mut set, spec)?;
        }

        resolve_call_sites(&mut set, self.check_consistency)?;
        index_dependencies(&mut set);
        warn_unreachable(&set);

        debug!(
            flows = set.flows.len(),
            nodes = set.nodes.len(),
            edges = set.edges.len(),
            "Flow set built"
        );
        Ok(set)
    }
}

fn add_flow(set: &mut FlowSet, spec: FlowBuilder) -> Result<()> {
    let flow_id = FlowId(set.flows.len());
    let mut flow = Flow {
        id: flow_id,
        name: spec.name,
        autostart: spec.autostart,
        nodes: vec![],
        edges: vec![],
        start_nodes: vec![],
        exit_nodes: vec![],
    };
    let mut by_name: HashMap<String, NodeId> = HashMap::new();

    for (name, kind) in spec.nodes {
        let id = NodeId(set.nodes.len());
        if by_name.insert(name.clone(), id).is_some() {
            return Err(inconsistent(&flow.name, format!("duplicate node name {name}")));
        }
        match kind {
            NodeKind::Start => flow.start_nodes.push(id),
            NodeKind::Exit => flow.exit_nodes.push(id),
            _ => {}
        }
        flow.nodes.push(id);
        set.nodes.push(Node {
            id,
            flow: flow_id,
            name,
            kind,
            incoming: vec![],
            outgoing: vec![],
        });
    }

    for (from, to, guard) in spec.edges {
        let lookup = |name: &str| {
            by_name.get(name).copied().ok_or_else(|| {
                inconsistent(
                    &flow.name,
                    format!("edge {from} -> {to} references unknown node {name}"),
                )
            })
        };
        let (from_id, to_id) = (lookup(&from)?, lookup(&to)?);
        let id = EdgeId(set.edges.len());
        set.nodes[from_id.0].outgoing.push(id);
        set.nodes[to_id.0].incoming.push(id);
        flow.edges.push(id);
        set.edges.push(Edge {
            id,
            flow: flow_id,
            from: from_id,
            to: to_id,
            guard,
        });
    }

    set.flows.push(flow);
    Ok(())
}

fn resolve_call_sites(set: &mut FlowSet, strict: bool) -> Result<()> {
    let flow_names: HashMap<String, FlowId> =
        set.flows.iter().map(|f| (f.name.clone(), f.id)).collect();

    for i in 0..set.nodes.len() {
        let owner = set.flows[set.nodes[i].flow.0].name.clone();
        let resolved = match &set.nodes[i].kind {
            NodeKind::Composed(call) => {
                let callee = flow_names.get(&call.flow).copied();
                let start = callee.and_then(|f| {
                    set.flows[f.0]
                        .start_nodes
                        .iter()
                        .copied()
                        .find(|s| set.nodes[s.0].name == call.start)
                });
                (callee, start, call.flow.clone(), call.start.clone())
            }
            _ => continue,
        };

        let (callee, start, flow_name, start_name) = resolved;
        if start.is_none() {
            let message = format!(
                "node {} calls missing start node {start_name} of flow {flow_name}",
                set.nodes[i].name
            );
            if strict {
                return Err(inconsistent(&owner, message));
            }
            warn!(flow = %owner, "{message}");
        }
        if let (Some(callee), Some(_)) = (callee, start) {
            set.callers.entry(callee).or_default().push(NodeId(i));
        }
        if let NodeKind::Composed(call) = &mut set.nodes[i].kind {
            call.callee_flow = start.and(callee);
            call.callee_start = start;
        }
    }
    Ok(())
}

fn index_dependencies(set: &mut FlowSet) {
    for edge in &set.edges {
        for object in edge.guard.terminal_objects() {
            set.index.add_edge(object, edge.id);
        }
        if edge.guard.reads_flow_state() {
            set.index.add_state_edge(edge.id);
        }
    }
    for node in &set.nodes {
        if let NodeKind::Action(action) = &node.kind {
            for object in action.dependencies() {
                set.index.add_node(object, node.id);
            }
        }
    }
}

fn warn_unreachable(set: &FlowSet) {
    for flow in &set.flows {
        let reachable: BTreeSet<NodeId> = flow
            .start_nodes
            .iter()
            .flat_map(|s| set.reachable_nodes(*s))
            .collect();
        for node in flow.nodes.iter().filter(|n| !reachable.contains(n)) {
            warn!(
                flow = %flow.name,
                node = %set.node(*node).name,
                "Node is not reachable from any start node"
            );
        }
    }
}

fn inconsistent(flow: &str, message: String) -> FluxError {
    FluxError::InconsistentFlow {
        flow: flow.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FactEquals, SetFact};

    #[test]
    fn test_build_wires_edges_and_designations() {
        let set = FlowSetBuilder::new()
            .add(
                FlowBuilder::new("Main")
                    .autostart()
                    .start("S")
                    .action("A", SetFact::new("a", true))
                    .exit("E")
                    .always("S", "A")
                    .edge("A", "E", FactEquals::new("X", true)),
            )
            .build()
            .unwrap();

        let flow = &set.flows()[0];
        assert!(flow.is_autostart());
        assert_eq!(flow.start_nodes().len(), 1);
        assert_eq!(flow.exit_nodes().len(), 1);
        assert_eq!(flow.edges().len(), 2);

        let a = set.find_node("Main", "A").unwrap();
        assert_eq!(set.node(a).incoming().len(), 1);
        assert_eq!(set.node(a).outgoing().len(), 1);
        assert_eq!(set.index().edges_for(&"X".into()).len(), 1);
    }

    #[test]
    fn test_edge_to_unknown_node_is_rejected() {
        let err = FlowSetBuilder::new()
            .add(FlowBuilder::new("Main").start("S").always("S", "Nowhere"))
            .build()
            .unwrap_err();
        assert!(matches!(err, FluxError::InconsistentFlow { ref flow, .. } if flow == "Main"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = FlowSetBuilder::new()
            .add(FlowBuilder::new("Main").start("S").exit("S"))
            .build()
            .unwrap_err();
        assert!(matches!(err, FluxError::InconsistentFlow { .. }));

        let err = FlowSetBuilder::new()
            .add(FlowBuilder::new("Main").start("S"))
            .add(FlowBuilder::new("Main").start("S"))
            .build()
            .unwrap_err();
        assert!(matches!(err, FluxError::DuplicateFlow(name) if name == "Main"));
    }

    #[test]
    fn test_missing_callee_rejected_when_strict() {
        let main = || {
            FlowBuilder::new("Main")
                .start("S")
                .composed("C", "Sub", "Begin")
                .always("S", "C")
        };
        assert!(FlowSetBuilder::new().add(main()).build().is_err());

        let set = FlowSetBuilder::new()
            .with_consistency_check(false)
            .add(main())
            .build()
            .unwrap();
        let c = set.find_node("Main", "C").unwrap();
        let call = set.node(c).call_site().unwrap();
        assert!(call.callee_start().is_none());
        assert!(call.callee_flow().is_none());
    }

    #[test]
    fn test_call_site_resolution() {
        let set = FlowSetBuilder::new()
            .add(
                FlowBuilder::new("Main")
                    .start("S")
                    .composed("C", "Sub", "Begin")
                    .always("S", "C"),
            )
            .add(FlowBuilder::new("Sub").start("Begin").exit("End").always("Begin", "End"))
            .build()
            .unwrap();
        let c = set.find_node("Main", "C").unwrap();
        let call = set.node(c).call_site().unwrap();
        assert_eq!(call.callee_start(), set.find_start_node("Sub", "Begin"));
        assert_eq!(call.callee_flow(), Some(set.find_flow("Sub").unwrap().id()));
    }
}
