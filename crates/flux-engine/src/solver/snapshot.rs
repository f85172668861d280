//! End-of-cycle snapshot commit.
//!
//! Runs that hold an entered snapshot node are retired: every node active in
//! them keeps its effects but drops its antecedents. Each snapshot node then
//! starts a fresh run together with the call-sites that are still waiting
//! on it, and propagation resumes from there.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, info, warn};

use flux_core::types::{FlowEvent, FlowId, NodeId, RunId};

use super::hooks;
use super::propagation::Propagation;
use crate::flow::NodeKind;

impl Propagation<'_> {
    /// Commit every snapshot entered since the last call. Returns the new runs.
    pub(crate) fn commit_snapshots(&mut self) -> Vec<RunId> {
        let entered = self.state.take_entered();
        if entered.is_empty() {
            return Vec::new();
        }

        let affected: Vec<RunId> = self
            .state
            .runs()
            .iter()
            .filter(|r| entered.iter().any(|s| r.is_active_id(*s)))
            .map(|r| r.id())
            .collect();

        let mut plans = Vec::with_capacity(entered.len());
        for &snapshot in &entered {
            let holding: Vec<RunId> = affected
                .iter()
                .copied()
                .filter(|id| self.state.run(*id).is_some_and(|r| r.is_active_id(snapshot)))
                .collect();
            if holding.is_empty() {
                warn!(node = %self.flows.node(snapshot).name(), "Entered snapshot is no longer active, not committed");
                continue;
            }
            let parents = self.parent_call_sites(snapshot, &holding);
            plans.push((snapshot, parents));
        }

        let frozen = self.freeze_runs(&affected);
        for &run in &affected {
            self.state.remove_run(run);
            info!(session_id = %self.session_id, run = %run, "Flow run retired by snapshot");
            self.publish(FlowEvent::RunRetired {
                session_id: self.session_id.clone(),
                run,
            });
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(plans.len());
        for (snapshot, parents) in plans {
            let mut starts = vec![snapshot];
            starts.extend(parents);
            let run = self.state.create_run(starts.clone());
            info!(
                session_id = %self.session_id,
                run = %run,
                snapshot = %self.flows.node(snapshot).name(),
                start_nodes = starts.len(),
                "Snapshot committed"
            );
            self.publish(FlowEvent::RunStarted {
                session_id: self.session_id.clone(),
                run,
                start_nodes: starts.clone(),
            });
            self.publish(FlowEvent::SnapshotCommitted {
                session_id: self.session_id.clone(),
                snapshot,
                run,
                frozen_nodes: frozen,
            });
            self.state.record_commit(snapshot, now);
            self.resume(run, &starts);
            created.push(run);
        }
        self.refresh_state_guards();
        created
    }

    /// Composed nodes, active alongside `snapshot`, that call into the
    /// snapshot's flow directly or through another such call-site, and that
    /// still have somewhere to go.
    pub(super) fn parent_call_sites(&self, snapshot: NodeId, runs: &[RunId]) -> Vec<NodeId> {
        let flows = self.flows;
        let frontier: BTreeSet<NodeId> = runs
            .iter()
            .filter_map(|id| self.state.run(*id))
            .flat_map(|r| r.active_nodes())
            .collect();

        let mut callee_flows: Vec<FlowId> = vec![flows.node(snapshot).flow()];
        let mut found: Vec<NodeId> = Vec::new();
        loop {
            let before = found.len();
            for &id in &frontier {
                if found.contains(&id) {
                    continue;
                }
                let node = flows.node(id);
                let calls_in = match node.kind() {
                    NodeKind::Composed(call) => call
                        .callee_flow()
                        .is_some_and(|f| callee_flows.contains(&f)),
                    _ => false,
                };
                if calls_in {
                    found.push(id);
                    if !callee_flows.contains(&node.flow()) {
                        callee_flows.push(node.flow());
                    }
                }
            }
            if found.len() == before {
                break;
            }
        }

        found
            .into_iter()
            .filter(|&c| {
                let keep = self.has_not_left(c, runs) || self.has_incoming_activation(c, runs, &frontier);
                debug!(node = %flows.node(c).name(), keep, "Call-site considered for new run");
                keep
            })
            .collect()
    }

    /// A true outgoing edge that has not fired yet: the call-site is still
    /// waiting to continue.
    fn has_not_left(&self, call_site: NodeId, runs: &[RunId]) -> bool {
        let flows = self.flows;
        let node = flows.node(call_site);
        runs.iter().filter_map(|id| self.state.run(*id)).any(|r| {
            r.is_active(node)
                && node.outgoing().iter().any(|&e| {
                    let edge = flows.edge(e);
                    !r.has_fired(edge) && self.evaluate(edge).is_true()
                })
        })
    }

    /// A true incoming edge from a frontier node that has not fired yet: the
    /// call-site is about to be entered again.
    fn has_incoming_activation(
        &self,
        call_site: NodeId,
        runs: &[RunId],
        frontier: &BTreeSet<NodeId>,
    ) -> bool {
        let flows = self.flows;
        let node = flows.node(call_site);
        runs.iter().filter_map(|id| self.state.run(*id)).any(|r| {
            r.is_active(node)
                && node.incoming().iter().any(|&e| {
                    let edge = flows.edge(e);
                    frontier.contains(&edge.from())
                        && r.is_active(flows.node(edge.from()))
                        && !r.has_fired(edge)
                        && self.evaluate(edge).is_true()
                })
        })
    }

    /// Pin every active node of the given runs and let it leave its run.
    /// Returns the number of nodes frozen.
    fn freeze_runs(&mut self, runs: &[RunId]) -> usize {
        let flows = self.flows;
        let mut count = 0;
        for &run in runs {
            let Some(r) = self.state.run_mut(run) else {
                continue;
            };
            let active = r.active_nodes();
            for &id in &active {
                r.make_permanent(flows.node(id));
            }
            for id in active {
                self.state.freeze(id);
                hooks::on_leave(self, flows.node(id));
                count += 1;
            }
        }
        count
    }

    /// Seed the start nodes of a fresh run and continue from them. Seeded
    /// nodes are not executed again and a seeded snapshot is not re-entered.
    fn resume(&mut self, run: RunId, starts: &[NodeId]) {
        let flows = self.flows;
        if let Some(r) = self.state.run_mut(run) {
            for &id in starts {
                r.seed(flows.node(id));
            }
        }
        for &id in starts {
            self.check_successors(id, run);
        }
    }
}
