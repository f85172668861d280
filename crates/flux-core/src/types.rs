use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a flow inside a loaded flow set.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FlowId(pub usize);

/// Index of a node in the flow set's node arena.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Index of an edge in the flow set's edge arena.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

/// Identity of a flow run, unique within its session.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge#{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Name of a fact in the fact store (a question, a solution, a variable).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events emitted while a session propagates through its flows.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    RunStarted {
        session_id: SessionId,
        run: RunId,
        start_nodes: Vec<NodeId>,
    },
    RunRetired {
        session_id: SessionId,
        run: RunId,
    },
    NodeActivated {
        session_id: SessionId,
        run: RunId,
        node: NodeId,
    },
    NodeDeactivated {
        session_id: SessionId,
        run: RunId,
        node: NodeId,
    },
    /// A snapshot node was reached; it is committed at the end of the cycle.
    SnapshotEntered {
        session_id: SessionId,
        run: RunId,
        node: NodeId,
    },
    SnapshotCommitted {
        session_id: SessionId,
        snapshot: NodeId,
        run: RunId,
        frozen_nodes: usize,
    },
}

impl FlowEvent {
    /// Short name used for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowEvent::RunStarted { .. } => "run_started",
            FlowEvent::RunRetired { .. } => "run_retired",
            FlowEvent::NodeActivated { .. } => "node_activated",
            FlowEvent::NodeDeactivated { .. } => "node_deactivated",
            FlowEvent::SnapshotEntered { .. } => "snapshot_entered",
            FlowEvent::SnapshotCommitted { .. } => "snapshot_committed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(NodeId(3).to_string(), "node#3");
        assert_eq!(RunId(7).to_string(), "run#7");
        assert_eq!(ObjectId::from("fever").to_string(), "fever");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = FlowEvent::NodeActivated {
            session_id: SessionId::from_str("s1"),
            run: RunId(1),
            node: NodeId(2),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_activated");
        assert_eq!(json["node"], 2);
        assert_eq!(event.kind(), "node_activated");
    }
}
