use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};

use flux_core::event::EventBus;
use flux_core::types::{EdgeId, FlowEvent, NodeId, RunId, SessionId};

use super::hooks;
use crate::blackboard::Blackboard;
use crate::flow::{Edge, EvalContext, FlowSet, Node, Truth};
use crate::session::Session;
use crate::state::{FluxState, Support};

/// One pass of the activation engine over a session.
///
/// Borrows the session's facts and flow state for the duration of a
/// `propagate`, `start` or `post_propagate` call.
pub(crate) struct Propagation<'a> {
    pub(super) flows: &'a FlowSet,
    pub(super) events: &'a EventBus,
    pub(super) session_id: &'a SessionId,
    pub(super) facts: &'a mut Blackboard,
    pub(super) state: &'a mut FluxState,
    /// Nodes retracted during this pass. A node cannot be activated again in
    /// the same run, so a second retraction means the sweep is looping.
    retracted: HashSet<(RunId, NodeId)>,
    /// Activations plus retractions so far in this pass.
    transitions: usize,
}

impl<'a> Propagation<'a> {
    pub(crate) fn new(flows: &'a FlowSet, events: &'a EventBus, session: &'a mut Session) -> Self {
        let Session {
            id, facts, state, ..
        } = session;
        Self {
            flows,
            events,
            session_id: id,
            facts,
            state,
            retracted: HashSet::new(),
            transitions: 0,
        }
    }

    pub(super) fn publish(&self, event: FlowEvent) {
        self.events.publish(event);
    }

    fn context(&self) -> EvalContext<'_> {
        EvalContext {
            facts: &*self.facts,
            flows: self.flows,
            state: &*self.state,
        }
    }

    pub(super) fn evaluate(&self, edge: &Edge) -> Truth {
        edge.evaluate(&self.context())
    }

    pub(super) fn can_fire(&self, node: &Node, run: RunId) -> bool {
        hooks::can_fire(self, node, run)
    }

    /// The edge would fire right now: its source may fire and its guard is
    /// true. Indeterminate guards count as false.
    pub(super) fn edge_holds(&self, edge: &Edge, run: RunId) -> bool {
        self.can_fire(self.flows.node(edge.from()), run) && self.evaluate(edge).is_true()
    }

    /// Create a run from one start node and activate it.
    pub(crate) fn begin(&mut self, start: NodeId) -> RunId {
        let run = self.state.create_run(vec![start]);
        info!(
            session_id = %self.session_id,
            run = %run,
            node = %self.flows.node(start).name(),
            "Starting flow run"
        );
        self.publish(FlowEvent::RunStarted {
            session_id: self.session_id.clone(),
            run,
            start_nodes: vec![start],
        });
        self.add_support(start, Support::Permanent, run);
        self.refresh_state_guards();
        run
    }

    /// Give `id` a support in `run`, activating it if it was unsupported.
    pub(super) fn add_support(&mut self, id: NodeId, support: Support, run: RunId) {
        let flows = self.flows;
        let node = flows.node(id);
        let Some(r) = self.state.run_mut(run) else {
            return;
        };
        if !r.is_active(node) && r.was_activated(id) {
            debug!(run = %run, node = %node.name(), "Node already ran in this run, support ignored");
            return;
        }
        if r.add_support(node, support) {
            self.activate(id, run);
        }
    }

    /// Take one support away from `id`, retracting it if nothing grounded is left.
    pub(super) fn remove_support(&mut self, id: NodeId, support: Support, run: RunId) {
        let flows = self.flows;
        let node = flows.node(id);
        let Some(r) = self.state.run_mut(run) else {
            return;
        };
        if !r.is_active(node) {
            return;
        }
        let unsupported = r.remove_support(node, &support);
        if unsupported || !self.check_support(id, run) {
            self.deactivate(id, run);
        }
    }

    /// Execute `id` in `run` unless it already ran there, then fire its true
    /// outgoing edges depth-first.
    pub(super) fn activate(&mut self, id: NodeId, run: RunId) {
        let flows = self.flows;
        let node = flows.node(id);
        let Some(r) = self.state.run_mut(run) else {
            return;
        };
        if !r.mark_activated(id) {
            debug!(run = %run, node = %node.name(), "Node already activated in this run");
            return;
        }
        self.transitions += 1;
        debug!(run = %run, node = %node.name(), kind = node.kind().label(), "Activating node");
        self.publish(FlowEvent::NodeActivated {
            session_id: self.session_id.clone(),
            run,
            node: id,
        });
        if hooks::on_activate(self, node, run) {
            self.check_successors(id, run);
        }
    }

    /// Bring every outgoing edge of `id` in line with its guard.
    pub(super) fn check_successors(&mut self, id: NodeId, run: RunId) {
        let flows = self.flows;
        for &edge in flows.node(id).outgoing() {
            self.reevaluate_edge(edge, run);
        }
    }

    /// Fire the edge if it newly holds, retract it if it no longer does.
    pub(crate) fn reevaluate_edge(&mut self, id: EdgeId, run: RunId) {
        let flows = self.flows;
        let edge = flows.edge(id);
        let Some(r) = self.state.run(run) else {
            return;
        };
        let source_active = r.is_active(flows.node(edge.from()));
        let fired = r.has_fired(edge);

        if !source_active {
            if fired {
                self.retract_edge(id, run);
            }
            return;
        }
        match (self.edge_holds(edge, run), fired) {
            (true, false) => self.fire_edge(id, run),
            (false, true) => self.retract_edge(id, run),
            _ => {}
        }
    }

    fn fire_edge(&mut self, id: EdgeId, run: RunId) {
        let flows = self.flows;
        let edge = flows.edge(id);
        let target = flows.node(edge.to());
        let Some(r) = self.state.run_mut(run) else {
            return;
        };
        if !r.is_active(target) && r.was_activated(target.id()) {
            debug!(run = %run, edge = %id, node = %target.name(), "Target already ran in this run, edge not fired");
            return;
        }
        let newly_supported = r.attach(edge);
        debug!(
            run = %run,
            from = %flows.node(edge.from()).name(),
            to = %target.name(),
            "Edge fired"
        );
        if newly_supported {
            self.activate(target.id(), run);
        }
    }

    fn retract_edge(&mut self, id: EdgeId, run: RunId) {
        let flows = self.flows;
        let edge = flows.edge(id);
        let target = edge.to();
        let Some(r) = self.state.run_mut(run) else {
            return;
        };
        if !r.has_fired(edge) {
            return;
        }
        let unsupported = r.detach(edge);
        debug!(
            run = %run,
            from = %flows.node(edge.from()).name(),
            to = %flows.node(target).name(),
            "Edge retracted"
        );
        if unsupported || !self.check_support(target, run) {
            self.deactivate(target, run);
        }
    }

    /// Retract a node whose support is gone: undo it and sweep everything it
    /// fired.
    pub(super) fn deactivate(&mut self, id: NodeId, run: RunId) {
        if !self.retracted.insert((run, id)) {
            warn!(run = %run, node = %id, "Node retracted twice in one pass, sweep stopped");
            return;
        }
        let flows = self.flows;
        let node = flows.node(id);
        let Some(r) = self.state.run_mut(run) else {
            return;
        };
        r.clear_supports(node);
        self.transitions += 1;
        debug!(run = %run, node = %node.name(), "Deactivating node");
        self.publish(FlowEvent::NodeDeactivated {
            session_id: self.session_id.clone(),
            run,
            node: id,
        });
        hooks::on_retract(self, node, run);
        self.maintain_truth(id, run);
    }

    /// Retract every fired outgoing edge of a node that just lost its support.
    pub(super) fn maintain_truth(&mut self, id: NodeId, run: RunId) {
        let flows = self.flows;
        for &edge in flows.node(id).outgoing() {
            let fired = self
                .state
                .run(run)
                .is_some_and(|r| r.has_fired(flows.edge(edge)));
            if fired {
                self.retract_edge(edge, run);
            }
        }
    }

    /// Whether the node's remaining supports still lead back to a permanent
    /// root through edges that hold and call-sites that are grounded.
    /// Circular support through a loop does not count.
    ///
    /// Grows the grounded set forward from the permanent roots of the run,
    /// so every node and edge is looked at once per check.
    pub(super) fn check_support(&self, id: NodeId, run: RunId) -> bool {
        let flows = self.flows;
        let Some(r) = self.state.run(run) else {
            return false;
        };
        let supported_by = |target: NodeId, support: &Support| {
            r.supports(flows.node(target))
                .is_some_and(|s| s.contains(support))
        };

        let mut grounded = HashSet::new();
        let mut queue = VecDeque::new();
        for root in r.active_nodes() {
            if supported_by(root, &Support::Permanent) {
                grounded.insert(root);
                queue.push_back(root);
            }
        }
        while let Some(current) = queue.pop_front() {
            if current == id {
                return true;
            }
            let node = flows.node(current);
            for &e in node.outgoing() {
                let edge = flows.edge(e);
                let target = edge.to();
                if !grounded.contains(&target)
                    && supported_by(target, &Support::FromEdge(e))
                    && self.edge_holds(edge, run)
                {
                    grounded.insert(target);
                    queue.push_back(target);
                }
            }
            if let Some(start) = node.call_site().and_then(|c| c.callee_start()) {
                if !grounded.contains(&start)
                    && supported_by(start, &Support::FromCallSite(current))
                {
                    grounded.insert(start);
                    queue.push_back(start);
                }
            }
        }
        false
    }

    /// Re-evaluate edges guarded by flow state until no node changes state.
    /// Each node activates at most once per run, so this terminates.
    pub(crate) fn refresh_state_guards(&mut self) {
        let flows = self.flows;
        let edges = flows.index().state_edges();
        if edges.is_empty() {
            return;
        }
        loop {
            let before = self.transitions;
            for &edge in edges {
                for run in self.state.run_ids() {
                    self.reevaluate_edge(edge, run);
                }
            }
            if self.transitions == before {
                break;
            }
        }
    }

    /// Re-run the update hook of an active node whose inputs changed.
    pub(crate) fn update_node(&mut self, id: NodeId) {
        if self.state.is_node_active(id) {
            let node = self.flows.node(id);
            debug!(node = %node.name(), "Updating node after dependency change");
            hooks::on_update(self, node);
        }
    }

    /// A callee exit changed in `run`: re-check the call-sites waiting on it.
    pub(super) fn notify_callers(&mut self, exit: &Node, run: RunId) {
        let flows = self.flows;
        for &caller in flows.calling_nodes(exit.flow()) {
            let waiting = self
                .state
                .run(run)
                .is_some_and(|r| r.is_active(flows.node(caller)));
            if waiting {
                debug!(run = %run, node = %flows.node(caller).name(), "Subflow exit changed, re-checking call-site");
                self.check_successors(caller, run);
            }
        }
    }
}
