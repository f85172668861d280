use std::fmt;

use serde_json::Value;

use flux_core::types::{NodeId, ObjectId};

use crate::blackboard::{Blackboard, FactSource};

/// Domain behavior of an action node.
///
/// Facts written under `FactSource::Node(node)` are owned by the node: the
/// default `undo` retracts them and the default `take_snapshot` hands them
/// over to the snapshot source.
pub trait NodeAction: Send + Sync + fmt::Debug {
    fn execute(&self, node: NodeId, facts: &mut Blackboard);

    fn undo(&self, node: NodeId, facts: &mut Blackboard) {
        facts.retract_source(FactSource::Node(node));
    }

    /// Called when one of `dependencies()` changed while the node is active.
    fn update(&self, node: NodeId, facts: &mut Blackboard) {
        self.execute(node, facts);
    }

    /// Called when the node leaves its run at a snapshot commit, before `undo`.
    fn take_snapshot(&self, node: NodeId, facts: &mut Blackboard) {
        facts.freeze(node);
    }

    fn can_fire(&self, _facts: &Blackboard) -> bool {
        true
    }

    /// Facts the action reads.
    fn dependencies(&self) -> Vec<ObjectId> {
        Vec::new()
    }
}

/// Sets a fact to a constant.
#[derive(Debug, Clone)]
pub struct SetFact {
    object: ObjectId,
    value: Value,
}

impl SetFact {
    pub fn new(object: impl Into<ObjectId>, value: impl Into<Value>) -> Self {
        Self {
            object: object.into(),
            value: value.into(),
        }
    }
}

impl NodeAction for SetFact {
    fn execute(&self, node: NodeId, facts: &mut Blackboard) {
        facts.assert_fact(FactSource::Node(node), self.object.clone(), self.value.clone());
    }
}

/// Copies the current value of one fact into another, following the source.
#[derive(Debug, Clone)]
pub struct CopyFact {
    from: ObjectId,
    to: ObjectId,
}

impl CopyFact {
    pub fn new(from: impl Into<ObjectId>, to: impl Into<ObjectId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl NodeAction for CopyFact {
    fn execute(&self, node: NodeId, facts: &mut Blackboard) {
        match facts.known(&self.from).cloned() {
            Some(value) => facts.assert_fact(FactSource::Node(node), self.to.clone(), value),
            None => facts.retract_fact(FactSource::Node(node), &self.to),
        }
    }

    fn dependencies(&self) -> Vec<ObjectId> {
        vec![self.from.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_fact_and_undo() {
        let mut facts = Blackboard::new();
        let action = SetFact::new("diagnosis", "flu");
        action.execute(NodeId(1), &mut facts);
        assert_eq!(facts.known(&"diagnosis".into()), Some(&json!("flu")));
        action.undo(NodeId(1), &mut facts);
        assert!(facts.known(&"diagnosis".into()).is_none());
    }

    #[test]
    fn test_snapshot_keeps_fact_after_undo() {
        let mut facts = Blackboard::new();
        let action = SetFact::new("diagnosis", "flu");
        action.execute(NodeId(1), &mut facts);
        action.take_snapshot(NodeId(1), &mut facts);
        action.undo(NodeId(1), &mut facts);
        assert_eq!(facts.known(&"diagnosis".into()), Some(&json!("flu")));
    }

    #[test]
    fn test_copy_fact_follows_source() {
        let mut facts = Blackboard::new();
        let action = CopyFact::new("temp", "reported_temp");
        assert_eq!(action.dependencies(), vec![ObjectId::from("temp")]);

        facts.set("temp", json!(39));
        action.execute(NodeId(2), &mut facts);
        assert_eq!(facts.known(&"reported_temp".into()), Some(&json!(39)));

        facts.clear("temp");
        action.update(NodeId(2), &mut facts);
        assert!(facts.known(&"reported_temp".into()).is_none());
    }
}
