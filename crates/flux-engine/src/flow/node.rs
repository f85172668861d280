use std::sync::Arc;

use flux_core::types::{EdgeId, FlowId, NodeId};

use super::action::NodeAction;

/// A node of a flow. Behavior is selected by [`NodeKind`].
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) flow: FlowId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) incoming: Vec<EdgeId>,
    pub(crate) outgoing: Vec<EdgeId>,
}

/// Closed set of node kinds. Every engine capability (activation, retraction,
/// leaving a run at snapshot time, the fire veto) is a `match` over this enum.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Start,
    Exit,
    /// Runs a domain action on activation and undoes it on retraction.
    Action(Arc<dyn NodeAction>),
    /// Calls a start node of another flow inside the same run.
    Composed(CallSite),
    /// Commit barrier; propagation stops here until the end of the cycle.
    Snapshot,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Exit => "exit",
            NodeKind::Action(_) => "action",
            NodeKind::Composed(_) => "composed",
            NodeKind::Snapshot => "snapshot",
        }
    }
}

/// Target of a composed node, resolved when the flow set is built.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub(crate) flow: String,
    pub(crate) start: String,
    pub(crate) callee_flow: Option<FlowId>,
    pub(crate) callee_start: Option<NodeId>,
}

impl CallSite {
    pub fn new(flow: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            start: start.into(),
            callee_flow: None,
            callee_start: None,
        }
    }

    /// Name of the called flow.
    pub fn flow_name(&self) -> &str {
        &self.flow
    }

    pub fn start_name(&self) -> &str {
        &self.start
    }

    /// `None` when the callee could not be resolved.
    pub fn callee_flow(&self) -> Option<FlowId> {
        self.callee_flow
    }

    pub fn callee_start(&self) -> Option<NodeId> {
        self.callee_start
    }
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, NodeKind::Snapshot)
    }

    /// The call-site, for composed nodes.
    pub fn call_site(&self) -> Option<&CallSite> {
        match &self.kind {
            NodeKind::Composed(call) => Some(call),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_call_site() {
        let call = CallSite::new("Sub", "Begin");
        assert_eq!(call.flow_name(), "Sub");
        assert_eq!(call.start_name(), "Begin");
        assert!(call.callee_flow().is_none());
        assert!(call.callee_start().is_none());
    }

    #[test]
    fn test_kind_helpers() {
        let node = Node {
            id: NodeId(0),
            flow: FlowId(0),
            name: "S".into(),
            kind: NodeKind::Snapshot,
            incoming: vec![],
            outgoing: vec![],
        };
        assert!(node.is_snapshot());
        assert!(node.call_site().is_none());
        assert_eq!(node.kind().label(), "snapshot");
    }
}
