use serde::Serialize;

use flux_core::types::{EdgeId, NodeId};

/// One justification for a node being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "via", rename_all = "snake_case")]
pub enum Support {
    /// The edge fired into the node.
    FromEdge(EdgeId),
    /// A composed node called this start node.
    FromCallSite(NodeId),
    /// No antecedent; never retracted by fact changes.
    Permanent,
}

/// The supports a node holds in one run. Empty means inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportSet(Vec<Support>);

impl SupportSet {
    /// Returns true if the set was empty before.
    pub fn insert(&mut self, support: Support) -> bool {
        let was_empty = self.0.is_empty();
        if !self.0.contains(&support) {
            self.0.push(support);
        }
        was_empty
    }

    /// Returns true if the support was present.
    pub fn remove(&mut self, support: &Support) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s != support);
        self.0.len() != before
    }

    pub fn contains(&self, support: &Support) -> bool {
        self.0.contains(support)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Support> {
        self.0.iter()
    }

    /// Edges among the supports.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.0.iter().filter_map(|s| match s {
            Support::FromEdge(edge) => Some(*edge),
            _ => None,
        })
    }

    pub fn is_permanent(&self) -> bool {
        self.0.contains(&Support::Permanent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_first_support() {
        let mut set = SupportSet::default();
        assert!(set.insert(Support::FromEdge(EdgeId(1))));
        assert!(!set.insert(Support::FromEdge(EdgeId(2))));
        assert!(!set.insert(Support::FromEdge(EdgeId(2))));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_and_edges() {
        let mut set = SupportSet::default();
        set.insert(Support::FromEdge(EdgeId(1)));
        set.insert(Support::FromCallSite(NodeId(4)));
        assert!(set.remove(&Support::FromEdge(EdgeId(1))));
        assert!(!set.remove(&Support::FromEdge(EdgeId(1))));
        assert_eq!(set.edges().count(), 0);
        assert!(!set.is_empty());
        assert!(!set.is_permanent());
    }
}
