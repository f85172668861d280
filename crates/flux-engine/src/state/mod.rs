//! Per-session execution state.

pub mod path;
pub mod run;
pub mod support;

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use flux_core::types::{EdgeId, NodeId, RunId};

pub use path::Path;
pub use run::FlowRun;
pub use support::{Support, SupportSet};

/// Everything the solver mutates for one session.
#[derive(Debug, Default)]
pub struct FluxState {
    runs: Vec<FlowRun>,
    next_run: u64,
    /// Snapshot nodes entered since the last commit.
    entered: Vec<NodeId>,
    /// Nodes that left a run at a snapshot commit.
    frozen: BTreeSet<NodeId>,
    commits: HashMap<NodeId, DateTime<Utc>>,
    cycles: u64,
}

impl FluxState {
    pub fn runs(&self) -> &[FlowRun] {
        &self.runs
    }

    pub fn run(&self, id: RunId) -> Option<&FlowRun> {
        self.runs.iter().find(|r| r.id() == id)
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs.iter().map(FlowRun::id).collect()
    }

    /// Active in at least one live run.
    pub fn is_node_active(&self, node: NodeId) -> bool {
        self.runs.iter().any(|r| r.is_active_id(node))
    }

    /// Fired in at least one live run.
    pub fn is_edge_active(&self, edge: EdgeId) -> bool {
        self.runs.iter().any(|r| r.has_fired_id(edge))
    }

    /// Snapshot nodes waiting for the end-of-cycle commit.
    pub fn entered_snapshots(&self) -> &[NodeId] {
        &self.entered
    }

    /// Whether the node was ever committed by a snapshot.
    pub fn is_frozen(&self, node: NodeId) -> bool {
        self.frozen.contains(&node)
    }

    pub fn frozen_nodes(&self) -> &BTreeSet<NodeId> {
        &self.frozen
    }

    /// When the snapshot node was last committed.
    pub fn last_commit(&self, snapshot: NodeId) -> Option<DateTime<Utc>> {
        self.commits.get(&snapshot).copied()
    }

    /// Completed propagation cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub(crate) fn run_mut(&mut self, id: RunId) -> Option<&mut FlowRun> {
        self.runs.iter_mut().find(|r| r.id() == id)
    }

    pub(crate) fn create_run(&mut self, start_nodes: Vec<NodeId>) -> RunId {
        self.next_run += 1;
        let id = RunId(self.next_run);
        self.runs.push(FlowRun::new(id, start_nodes));
        id
    }

    pub(crate) fn remove_run(&mut self, id: RunId) -> Option<FlowRun> {
        let pos = self.runs.iter().position(|r| r.id() == id)?;
        Some(self.runs.remove(pos))
    }

    pub(crate) fn enter_snapshot(&mut self, node: NodeId) {
        if !self.entered.contains(&node) {
            self.entered.push(node);
        }
    }

    /// Forget an entered snapshot that was retracted before the commit,
    /// unless another run still holds it.
    pub(crate) fn leave_snapshot(&mut self, node: NodeId) {
        if !self.is_node_active(node) {
            self.entered.retain(|n| *n != node);
        }
    }

    pub(crate) fn take_entered(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.entered)
    }

    pub(crate) fn freeze(&mut self, node: NodeId) {
        self.frozen.insert(node);
    }

    pub(crate) fn record_commit(&mut self, snapshot: NodeId, at: DateTime<Utc>) {
        self.commits.insert(snapshot, at);
    }

    pub(crate) fn finish_cycle(&mut self) {
        self.cycles += 1;
    }
}
