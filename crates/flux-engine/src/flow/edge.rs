use std::sync::Arc;

use flux_core::types::{EdgeId, FlowId, NodeId};

use super::condition::{Condition, EvalContext, Truth};

/// A guarded connection between two nodes of the same flow.
#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) flow: FlowId,
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
    pub(crate) guard: Arc<dyn Condition>,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn guard(&self) -> &Arc<dyn Condition> {
        &self.guard
    }

    /// Evaluate the guard. Indeterminate results are the caller's to fold.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        self.guard.evaluate(ctx)
    }
}
