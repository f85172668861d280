//! The flux solver: seeds flow runs, propagates fact changes through the
//! flows of a session and commits snapshots at the end of each cycle.

mod hooks;
mod propagation;
mod snapshot;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use flux_core::config::SolverConfig;
use flux_core::error::{FluxError, Result};
use flux_core::event::EventBus;
use flux_core::types::{EdgeId, NodeId, RunId, SessionId};

use crate::blackboard::PropagationEntry;
use crate::flow::{EvalContext, FlowSet, NodeKind, Truth};
use crate::session::Session;
use crate::state::FlowRun;

use propagation::Propagation;

/// Stateless driver shared by all sessions of one flow set.
pub struct FluxSolver {
    flows: Arc<FlowSet>,
    config: SolverConfig,
    events: Arc<EventBus>,
}

impl FluxSolver {
    pub fn new(flows: Arc<FlowSet>, config: SolverConfig) -> Self {
        let events = Arc::new(EventBus::new(config.event_capacity));
        Self {
            flows,
            config,
            events,
        }
    }

    /// Publish flow events on an existing bus.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn flows(&self) -> &Arc<FlowSet> {
        &self.flows
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Open a session: seed autostart flows (if configured) and settle the
    /// first cycle.
    pub fn open_session(&self) -> Session {
        self.open_session_with_id(SessionId::new())
    }

    pub fn open_session_with_id(&self, id: SessionId) -> Session {
        let mut session = Session::with_id(id);
        if self.config.autostart {
            self.init(&mut session);
        }
        self.run_cycle(&mut session);
        session
    }

    /// Seed one run per start node of every autostart flow.
    pub fn init(&self, session: &mut Session) {
        let starts = self.flows.autostart_nodes();
        debug!(session_id = %session.id(), starts = starts.len(), "Seeding autostart flows");
        for start in starts {
            Propagation::new(&self.flows, &self.events, session).begin(start);
        }
    }

    /// Start a named flow at a named start node in a new run. A missing
    /// flow or start node is logged and nothing happens.
    pub fn start(&self, session: &mut Session, flow: &str, start: &str) -> Option<RunId> {
        let node = self.flows.find_start_node(flow, start)?;
        Some(Propagation::new(&self.flows, &self.events, session).begin(node))
    }

    /// Process a batch of fact changes in order. Each change is fully
    /// resolved before the next one is looked at.
    pub fn propagate(&self, session: &mut Session, batch: &[PropagationEntry]) {
        let index = self.flows.index();
        let mut pass = Propagation::new(&self.flows, &self.events, session);
        for entry in batch {
            let edges = index.edges_for(&entry.object);
            let nodes = index.nodes_for(&entry.object);
            if edges.is_empty() && nodes.is_empty() {
                continue;
            }
            debug!(object = %entry.object, edges = edges.len(), nodes = nodes.len(), "Propagating fact change");
            for &edge in edges {
                for run in pass.state.run_ids() {
                    pass.reevaluate_edge(edge, run);
                }
            }
            for &node in nodes {
                pass.update_node(node);
            }
            pass.refresh_state_guards();
        }
    }

    /// Commit the snapshots entered during the cycle. Returns the new runs.
    pub fn post_propagate(&self, session: &mut Session) -> Vec<RunId> {
        Propagation::new(&self.flows, &self.events, session).commit_snapshots()
    }

    /// Drain the session's fact changes into `propagate` until the flows
    /// settle, then run `post_propagate` once. When a commit forks new runs
    /// whose actions write facts, a follow-up cycle propagates those facts.
    /// All passes share the `max_propagation_rounds` budget.
    pub fn run_cycle(&self, session: &mut Session) -> Vec<RunId> {
        let mut rounds = 0;
        let mut created = Vec::new();
        loop {
            let mut settled = true;
            while session.facts().has_changes() {
                if rounds >= self.config.max_propagation_rounds {
                    warn!(
                        session_id = %session.id(),
                        rounds,
                        "Propagation did not settle, remaining changes deferred to the next cycle"
                    );
                    settled = false;
                    break;
                }
                let batch = session.facts_mut().take_changes();
                self.propagate(session, &batch);
                rounds += 1;
            }
            let forked = self.post_propagate(session);
            session.state.finish_cycle();
            let follow_up = settled && !forked.is_empty() && session.facts().has_changes();
            created.extend(forked);
            if !follow_up {
                break;
            }
            debug!(session_id = %session.id(), "Committed runs changed facts, running follow-up cycle");
        }
        if !created.is_empty() {
            info!(session_id = %session.id(), runs = created.len(), "Propagation cycle forked new runs");
        }
        created
    }

    /// Active in any live run of the session.
    pub fn is_node_active(&self, session: &Session, node: NodeId) -> Result<bool> {
        self.flows.try_node(node)?;
        Ok(session.state().is_node_active(node))
    }

    /// Lookup by names; a miss is logged and reads as inactive.
    pub fn is_active(&self, session: &Session, flow: &str, node: &str) -> bool {
        self.flows
            .find_node(flow, node)
            .is_some_and(|id| session.state().is_node_active(id))
    }

    pub fn is_edge_active(&self, session: &Session, edge: EdgeId) -> Result<bool> {
        self.flows.try_edge(edge)?;
        Ok(session.state().is_edge_active(edge))
    }

    pub fn active_nodes(&self, session: &Session, run: RunId) -> Result<BTreeSet<NodeId>> {
        self.run(session, run).map(FlowRun::active_nodes)
    }

    pub fn active_edges(&self, session: &Session, run: RunId) -> Result<BTreeSet<EdgeId>> {
        self.run(session, run).map(FlowRun::fired_edges)
    }

    pub fn has_fired(&self, session: &Session, edge: EdgeId, run: RunId) -> Result<bool> {
        let edge = self.flows.try_edge(edge)?;
        Ok(self.run(session, run)?.has_fired(edge))
    }

    /// Outgoing edges of active nodes whose guards wait on unknown facts.
    pub fn pending_edges(&self, session: &Session) -> BTreeSet<EdgeId> {
        let ctx = EvalContext {
            facts: session.facts(),
            flows: &self.flows,
            state: session.state(),
        };
        let mut pending = BTreeSet::new();
        for run in session.state().runs() {
            for node in run.active_nodes() {
                let node = self.flows.node(node);
                if matches!(node.kind(), NodeKind::Snapshot) {
                    continue;
                }
                for &e in node.outgoing() {
                    let edge = self.flows.edge(e);
                    if !run.has_fired(edge) && edge.evaluate(&ctx) == Truth::Indeterminate {
                        pending.insert(e);
                    }
                }
            }
        }
        pending
    }

    fn run<'s>(&self, session: &'s Session, run: RunId) -> Result<&'s FlowRun> {
        session.state().run(run).ok_or(FluxError::UnknownRun(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::flow::{CopyFact, FlowBuilder, FlowSetBuilder};

    fn copy_chain(rounds: usize) -> (FluxSolver, Session) {
        let flows = FlowSetBuilder::new()
            .add(
                FlowBuilder::new("Main")
                    .autostart()
                    .start("S")
                    .action("AB", CopyFact::new("a", "b"))
                    .action("BC", CopyFact::new("b", "c"))
                    .always("S", "AB")
                    .always("S", "BC"),
            )
            .build()
            .unwrap();
        let config = SolverConfig {
            max_propagation_rounds: rounds,
            ..SolverConfig::default()
        };
        let solver = FluxSolver::new(Arc::new(flows), config);
        let session = solver.open_session();
        (solver, session)
    }

    #[test]
    fn test_action_writes_settle_within_one_cycle() {
        let (solver, mut session) = copy_chain(8);
        session.facts_mut().set("a", json!(1));
        solver.run_cycle(&mut session);
        assert_eq!(session.facts().known(&"c".into()), Some(&json!(1)));
        assert!(!session.facts().has_changes());
    }

    #[test]
    fn test_round_limit_defers_remaining_changes() {
        let (solver, mut session) = copy_chain(1);
        session.facts_mut().set("a", json!(1));
        solver.run_cycle(&mut session);
        assert_eq!(session.facts().known(&"b".into()), Some(&json!(1)));
        assert_eq!(session.facts().known(&"c".into()), None);
        assert!(session.facts().has_changes());

        solver.run_cycle(&mut session);
        assert_eq!(session.facts().known(&"c".into()), Some(&json!(1)));
    }

    #[test]
    fn test_cycles_are_counted() {
        let (solver, mut session) = copy_chain(8);
        assert_eq!(session.state().cycles(), 1);
        solver.run_cycle(&mut session);
        assert_eq!(session.state().cycles(), 2);
    }
}
