//! Helpers shared by the flux integration tests.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tempfile::NamedTempFile;

use flux_core::config::SolverConfig;
use flux_core::types::{EdgeId, NodeId, ObjectId, RunId};
use flux_engine::{
    Blackboard, FactSource, FlowSet, FlowSetBuilder, FluxSolver, NodeAction, Session,
};

/// Which hook a [`RecordingAction`] saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Execute,
    Undo,
    Update,
    Snapshot,
}

/// Shared record of hook calls, in call order.
#[derive(Debug, Clone, Default)]
pub struct ActionLog(Arc<Mutex<Vec<(String, Hook)>>>);

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, label: &str, hook: Hook) {
        self.0.lock().unwrap().push((label.to_string(), hook));
    }

    pub fn count(&self, label: &str, hook: Hook) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, h)| l == label && *h == hook)
            .count()
    }

    pub fn executions(&self, label: &str) -> usize {
        self.count(label, Hook::Execute)
    }

    pub fn undos(&self, label: &str) -> usize {
        self.count(label, Hook::Undo)
    }

    pub fn entries(&self) -> Vec<(String, Hook)> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Action that records its hook calls and asserts `<label>.done = true`
/// while active.
#[derive(Debug, Clone)]
pub struct RecordingAction {
    label: String,
    log: ActionLog,
}

impl RecordingAction {
    pub fn new(label: impl Into<String>, log: &ActionLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
        }
    }

    pub fn done_fact(label: &str) -> ObjectId {
        ObjectId::new(format!("{label}.done"))
    }
}

impl NodeAction for RecordingAction {
    fn execute(&self, node: NodeId, facts: &mut Blackboard) {
        self.log.push(&self.label, Hook::Execute);
        facts.assert_fact(
            FactSource::Node(node),
            Self::done_fact(&self.label),
            Value::Bool(true),
        );
    }

    fn undo(&self, node: NodeId, facts: &mut Blackboard) {
        self.log.push(&self.label, Hook::Undo);
        facts.retract_source(FactSource::Node(node));
    }

    fn update(&self, node: NodeId, facts: &mut Blackboard) {
        self.log.push(&self.label, Hook::Update);
        self.execute(node, facts);
    }

    fn take_snapshot(&self, node: NodeId, facts: &mut Blackboard) {
        self.log.push(&self.label, Hook::Snapshot);
        facts.freeze(node);
    }
}

/// A solver plus one open session, with lookups by name.
pub struct Harness {
    pub solver: FluxSolver,
    pub session: Session,
}

impl Harness {
    pub fn new(flows: FlowSetBuilder) -> Self {
        Self::with_config(flows, SolverConfig::default())
    }

    pub fn with_config(flows: FlowSetBuilder, config: SolverConfig) -> Self {
        let flows = flows.build().expect("flow set builds");
        let solver = FluxSolver::new(Arc::new(flows), config);
        let session = solver.open_session();
        Self { solver, session }
    }

    pub fn flows(&self) -> &FlowSet {
        self.solver.flows()
    }

    /// Set a user fact and run one propagation cycle.
    pub fn set(&mut self, object: &str, value: Value) -> Vec<RunId> {
        self.session.facts_mut().set(object, value);
        self.cycle()
    }

    /// Withdraw a user fact and run one propagation cycle.
    pub fn clear(&mut self, object: &str) -> Vec<RunId> {
        self.session.facts_mut().clear(object);
        self.cycle()
    }

    pub fn cycle(&mut self) -> Vec<RunId> {
        self.solver.run_cycle(&mut self.session)
    }

    pub fn node(&self, flow: &str, name: &str) -> NodeId {
        self.flows()
            .find_node(flow, name)
            .unwrap_or_else(|| panic!("node {flow}/{name} exists"))
    }

    pub fn edge(&self, flow: &str, from: &str, to: &str) -> EdgeId {
        let (from, to) = (self.node(flow, from), self.node(flow, to));
        self.flows()
            .node(from)
            .outgoing()
            .iter()
            .copied()
            .find(|e| self.flows().edge(*e).to() == to)
            .unwrap_or_else(|| panic!("edge {flow}/{from} -> {to} exists"))
    }

    pub fn active(&self, flow: &str, name: &str) -> bool {
        self.solver
            .is_node_active(&self.session, self.node(flow, name))
            .unwrap()
    }

    pub fn runs(&self) -> Vec<RunId> {
        self.session.state().run_ids()
    }

    /// The only live run.
    pub fn single_run(&self) -> RunId {
        let runs = self.runs();
        assert_eq!(runs.len(), 1, "expected exactly one run, got {runs:?}");
        runs[0]
    }

    /// Start nodes of a run, by name.
    pub fn start_names(&self, run: RunId) -> Vec<String> {
        let run = self.session.state().run(run).expect("run exists");
        run.start_nodes()
            .iter()
            .map(|n| self.flows().node(*n).name().to_string())
            .collect()
    }

    pub fn fact(&self, object: &str) -> Option<Value> {
        self.session.facts().known(&ObjectId::from(object)).cloned()
    }
}

/// Write TOML content to a temp file for config loading tests.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}
