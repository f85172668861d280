use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use flux_core::types::{NodeId, ObjectId};

/// Who asserted a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "node", rename_all = "snake_case")]
pub enum FactSource {
    User,
    Node(NodeId),
    /// Facts handed over by nodes that left their run at a snapshot commit.
    Snapshot,
}

#[derive(Debug, Clone)]
struct Entry {
    source: FactSource,
    value: Value,
}

/// One effective change of a fact, as delivered to the solver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationEntry {
    pub object: ObjectId,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl PropagationEntry {
    pub fn new(object: impl Into<ObjectId>, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            object: object.into(),
            old,
            new,
        }
    }
}

/// In-memory fact store of one session.
///
/// Each object keeps one value per source. The most recent user or node
/// value wins; snapshot values only show through when nothing else is left.
/// Every change of the effective value is queued as a [`PropagationEntry`].
#[derive(Debug, Default)]
pub struct Blackboard {
    facts: BTreeMap<ObjectId, Vec<Entry>>,
    changes: Vec<PropagationEntry>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective value, which may be `Value::Null`.
    pub fn value(&self, object: &ObjectId) -> Option<&Value> {
        let entries = self.facts.get(object)?;
        entries
            .iter()
            .rev()
            .find(|e| e.source != FactSource::Snapshot)
            .or_else(|| entries.iter().rev().find(|e| e.source == FactSource::Snapshot))
            .map(|e| &e.value)
    }

    /// Effective value unless absent or explicitly unknown (`null`).
    pub fn known(&self, object: &ObjectId) -> Option<&Value> {
        self.value(object).filter(|v| !v.is_null())
    }

    /// Value asserted by one particular source.
    pub fn value_from(&self, source: FactSource, object: &ObjectId) -> Option<&Value> {
        self.facts
            .get(object)?
            .iter()
            .find(|e| e.source == source)
            .map(|e| &e.value)
    }

    /// Set a user answer.
    pub fn set(&mut self, object: impl Into<ObjectId>, value: Value) {
        self.assert_fact(FactSource::User, object, value);
    }

    /// Withdraw a user answer.
    pub fn clear(&mut self, object: impl Into<ObjectId>) {
        let object = object.into();
        self.retract_fact(FactSource::User, &object);
    }

    pub fn assert_fact(&mut self, source: FactSource, object: impl Into<ObjectId>, value: Value) {
        self.mutate(object.into(), |entries| {
            entries.retain(|e| e.source != source);
            entries.push(Entry { source, value });
        });
    }

    pub fn retract_fact(&mut self, source: FactSource, object: &ObjectId) {
        if self.value_from(source, object).is_none() {
            return;
        }
        self.mutate(object.clone(), |entries| entries.retain(|e| e.source != source));
    }

    /// Drop every fact asserted by `source`.
    pub fn retract_source(&mut self, source: FactSource) {
        for object in self.objects_from(source) {
            self.mutate(object, |entries| entries.retain(|e| e.source != source));
        }
    }

    /// Hand the node's facts over to the snapshot source.
    pub fn freeze(&mut self, node: NodeId) {
        let source = FactSource::Node(node);
        for object in self.objects_from(source) {
            self.mutate(object, |entries| {
                let Some(pos) = entries.iter().position(|e| e.source == source) else {
                    return;
                };
                let entry = entries.remove(pos);
                entries.retain(|e| e.source != FactSource::Snapshot);
                entries.push(Entry {
                    source: FactSource::Snapshot,
                    value: entry.value,
                });
            });
        }
    }

    /// Drain the queued changes, oldest first.
    pub fn take_changes(&mut self) -> Vec<PropagationEntry> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Effective values of all objects, for display.
    pub fn snapshot_values(&self) -> BTreeMap<ObjectId, Value> {
        self.facts
            .keys()
            .filter_map(|k| self.value(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    fn objects_from(&self, source: FactSource) -> Vec<ObjectId> {
        self.facts
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.source == source))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn mutate(&mut self, object: ObjectId, f: impl FnOnce(&mut Vec<Entry>)) {
        let old = self.value(&object).cloned();
        let entries = self.facts.entry(object.clone()).or_default();
        f(entries);
        if entries.is_empty() {
            self.facts.remove(&object);
        }
        let new = self.value(&object).cloned();
        if old != new {
            self.changes.push(PropagationEntry { object, old, new });
        }
    }
}
