//! Per-kind node behavior. Each capability is one exhaustive `match`.

use tracing::{error, info};

use flux_core::types::{FlowEvent, RunId};

use super::propagation::Propagation;
use crate::flow::{Node, NodeKind};
use crate::state::Support;

/// Domain side of activation. Returns false when propagation stops at the node.
pub(super) fn on_activate(p: &mut Propagation<'_>, node: &Node, run: RunId) -> bool {
    match node.kind() {
        NodeKind::Start => true,
        NodeKind::Exit => {
            p.notify_callers(node, run);
            true
        }
        NodeKind::Action(action) => {
            action.execute(node.id(), p.facts);
            true
        }
        NodeKind::Composed(call) => {
            match call.callee_start() {
                Some(start) => p.add_support(start, Support::FromCallSite(node.id()), run),
                None => error!(
                    node = %node.name(),
                    flow = call.flow_name(),
                    start = call.start_name(),
                    "Callee start node not found, call skipped"
                ),
            }
            true
        }
        NodeKind::Snapshot => {
            p.state.enter_snapshot(node.id());
            info!(run = %run, node = %node.name(), "Snapshot entered");
            p.publish(FlowEvent::SnapshotEntered {
                session_id: p.session_id.clone(),
                run,
                node: node.id(),
            });
            false
        }
    }
}

/// Domain side of retraction, after the node's supports are gone.
pub(super) fn on_retract(p: &mut Propagation<'_>, node: &Node, run: RunId) {
    match node.kind() {
        NodeKind::Start => {}
        NodeKind::Exit => p.notify_callers(node, run),
        NodeKind::Action(action) => action.undo(node.id(), p.facts),
        NodeKind::Composed(call) => {
            if let Some(start) = call.callee_start() {
                p.remove_support(start, Support::FromCallSite(node.id()), run);
            }
        }
        NodeKind::Snapshot => p.state.leave_snapshot(node.id()),
    }
}

/// The node leaves a run that a snapshot commit retires. Its effects are
/// kept, not un-derived.
pub(super) fn on_leave(p: &mut Propagation<'_>, node: &Node) {
    match node.kind() {
        NodeKind::Action(action) => {
            action.take_snapshot(node.id(), p.facts);
            action.undo(node.id(), p.facts);
        }
        NodeKind::Start | NodeKind::Exit | NodeKind::Composed(_) | NodeKind::Snapshot => {}
    }
}

pub(super) fn on_update(p: &mut Propagation<'_>, node: &Node) {
    match node.kind() {
        NodeKind::Action(action) => action.update(node.id(), p.facts),
        NodeKind::Start | NodeKind::Exit | NodeKind::Composed(_) | NodeKind::Snapshot => {}
    }
}

/// Veto on firing outgoing edges. A call-site waits until its callee has
/// reached an exit in the same run; a snapshot waits for its commit.
pub(super) fn can_fire(p: &Propagation<'_>, node: &Node, run: RunId) -> bool {
    match node.kind() {
        NodeKind::Action(action) => action.can_fire(&*p.facts),
        NodeKind::Composed(call) => {
            let Some(callee) = call.callee_flow() else {
                return false;
            };
            let Some(r) = p.state.run(run) else {
                return false;
            };
            p.flows
                .flow(callee)
                .exit_nodes()
                .iter()
                .any(|exit| r.is_active(p.flows.node(*exit)))
        }
        // A snapshot only leads on from the run its commit started.
        NodeKind::Snapshot => p
            .state
            .run(run)
            .is_some_and(|r| r.start_nodes().contains(&node.id())),
        NodeKind::Start | NodeKind::Exit => true,
    }
}
