//! Flowchart execution engine.
//!
//! A knowledge base is a [`FlowSet`]: named flows of nodes connected by
//! guarded edges, built once and shared read-only between sessions. Each
//! [`Session`] carries its own [`Blackboard`] of facts and its own
//! [`FluxState`] (flow runs, support sets, fired flags). The [`FluxSolver`]
//! drives activation and truth maintenance when facts change and commits
//! snapshot nodes at the end of every propagation cycle.

pub mod blackboard;
pub mod flow;
pub mod session;
pub mod solver;
pub mod state;

pub use blackboard::{Blackboard, FactSource, PropagationEntry};
pub use flow::{
    Always, And, CallSite, Condition, CopyFact, DependencyIndex, Edge, EvalContext, FactEquals,
    FactKnown, Flow, FlowBuilder, FlowProcessed, FlowSet, FlowSetBuilder, Node, NodeAction,
    NodeActive, NodeKind, Not, Or, SetFact, Truth,
};
pub use session::{Session, SessionManager};
pub use solver::FluxSolver;
pub use state::{FlowRun, FluxState, Path, Support, SupportSet};
