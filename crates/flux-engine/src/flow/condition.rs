use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use flux_core::types::ObjectId;

use crate::blackboard::Blackboard;
use crate::flow::FlowSet;
use crate::state::FluxState;

/// Three-valued result of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    /// The guard depends on a fact that is absent or unknown.
    Indeterminate,
}

impl Truth {
    /// Only `True` lets an edge fire; `Indeterminate` folds into false.
    pub fn is_true(self) -> bool {
        self == Truth::True
    }

    pub fn negate(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Indeterminate => Truth::Indeterminate,
        }
    }

    pub fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Indeterminate,
        }
    }

    pub fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Indeterminate,
        }
    }
}

impl From<bool> for Truth {
    fn from(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }
}

/// What a guard may look at: the session's facts and its flow state.
pub struct EvalContext<'a> {
    pub facts: &'a Blackboard,
    pub flows: &'a FlowSet,
    pub state: &'a FluxState,
}

/// An edge guard.
pub trait Condition: Send + Sync + fmt::Debug {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth;

    /// Facts this guard reads. A change to any of them re-evaluates the edge.
    fn terminal_objects(&self) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Whether the guard looks at node or flow activity. Such edges are
    /// re-evaluated whenever nodes change state.
    fn reads_flow_state(&self) -> bool {
        false
    }
}

/// Unconditional guard.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Condition for Always {
    fn evaluate(&self, _ctx: &EvalContext<'_>) -> Truth {
        Truth::True
    }
}

/// `object == value`; indeterminate while the fact is unknown.
#[derive(Debug, Clone)]
pub struct FactEquals {
    object: ObjectId,
    value: Value,
}

impl FactEquals {
    pub fn new(object: impl Into<ObjectId>, value: impl Into<Value>) -> Self {
        Self {
            object: object.into(),
            value: value.into(),
        }
    }
}

impl Condition for FactEquals {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        match ctx.facts.known(&self.object) {
            Some(v) => Truth::from(*v == self.value),
            None => Truth::Indeterminate,
        }
    }

    fn terminal_objects(&self) -> Vec<ObjectId> {
        vec![self.object.clone()]
    }
}

/// True once the fact has any known value.
#[derive(Debug, Clone)]
pub struct FactKnown {
    object: ObjectId,
}

impl FactKnown {
    pub fn new(object: impl Into<ObjectId>) -> Self {
        Self {
            object: object.into(),
        }
    }
}

impl Condition for FactKnown {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        Truth::from(ctx.facts.known(&self.object).is_some())
    }

    fn terminal_objects(&self) -> Vec<ObjectId> {
        vec![self.object.clone()]
    }
}

#[derive(Debug, Clone)]
pub struct Not(Arc<dyn Condition>);

impl Not {
    pub fn new(inner: impl Condition + 'static) -> Self {
        Self(Arc::new(inner))
    }
}

impl Condition for Not {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        self.0.evaluate(ctx).negate()
    }

    fn terminal_objects(&self) -> Vec<ObjectId> {
        self.0.terminal_objects()
    }

    fn reads_flow_state(&self) -> bool {
        self.0.reads_flow_state()
    }
}

/// Conjunction with three-valued semantics.
#[derive(Debug, Clone, Default)]
pub struct And(Vec<Arc<dyn Condition>>);

impl And {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, term: impl Condition + 'static) -> Self {
        self.0.push(Arc::new(term));
        self
    }
}

impl Condition for And {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        self.0
            .iter()
            .fold(Truth::True, |acc, term| acc.and(term.evaluate(ctx)))
    }

    fn terminal_objects(&self) -> Vec<ObjectId> {
        self.0.iter().flat_map(|t| t.terminal_objects()).collect()
    }

    fn reads_flow_state(&self) -> bool {
        self.0.iter().any(|t| t.reads_flow_state())
    }
}

/// Disjunction with three-valued semantics.
#[derive(Debug, Clone, Default)]
pub struct Or(Vec<Arc<dyn Condition>>);

impl Or {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, term: impl Condition + 'static) -> Self {
        self.0.push(Arc::new(term));
        self
    }
}

impl Condition for Or {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        self.0
            .iter()
            .fold(Truth::False, |acc, term| acc.or(term.evaluate(ctx)))
    }

    fn terminal_objects(&self) -> Vec<ObjectId> {
        self.0.iter().flat_map(|t| t.terminal_objects()).collect()
    }

    fn reads_flow_state(&self) -> bool {
        self.0.iter().any(|t| t.reads_flow_state())
    }
}

/// True while the named node is active in any run of the session.
#[derive(Debug, Clone)]
pub struct NodeActive {
    flow: String,
    node: String,
}

impl NodeActive {
    pub fn new(flow: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            node: node.into(),
        }
    }
}

impl Condition for NodeActive {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        match ctx.flows.find_node(&self.flow, &self.node) {
            Some(id) => Truth::from(ctx.state.is_node_active(id)),
            None => Truth::Indeterminate,
        }
    }

    fn reads_flow_state(&self) -> bool {
        true
    }
}

/// True while any exit node of the named flow is active.
#[derive(Debug, Clone)]
pub struct FlowProcessed {
    flow: String,
}

impl FlowProcessed {
    pub fn new(flow: impl Into<String>) -> Self {
        Self { flow: flow.into() }
    }
}

impl Condition for FlowProcessed {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Truth {
        match ctx.flows.find_flow(&self.flow) {
            Some(flow) => Truth::from(
                flow.exit_nodes()
                    .iter()
                    .any(|exit| ctx.state.is_node_active(*exit)),
            ),
            None => Truth::Indeterminate,
        }
    }

    fn reads_flow_state(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::FactSource;
    use crate::flow::{FlowBuilder, FlowSetBuilder};
    use serde_json::json;

    fn flows() -> FlowSet {
        FlowSetBuilder::new()
            .add(FlowBuilder::new("Main").start("Start").exit("Done"))
            .build()
            .unwrap()
    }

    fn eval(cond: &dyn Condition, facts: &Blackboard) -> Truth {
        let flows = flows();
        let state = FluxState::default();
        cond.evaluate(&EvalContext {
            facts,
            flows: &flows,
            state: &state,
        })
    }

    #[test]
    fn test_three_valued_logic() {
        use Truth::*;
        assert_eq!(True.and(Indeterminate), Indeterminate);
        assert_eq!(False.and(Indeterminate), False);
        assert_eq!(True.or(Indeterminate), True);
        assert_eq!(False.or(Indeterminate), Indeterminate);
        assert_eq!(Indeterminate.negate(), Indeterminate);
        assert!(!Indeterminate.is_true());
    }

    #[test]
    fn test_fact_equals_is_indeterminate_while_unknown() {
        let mut facts = Blackboard::new();
        let cond = FactEquals::new("X", true);
        assert_eq!(eval(&cond, &facts), Truth::Indeterminate);

        facts.set("X", Value::Null);
        assert_eq!(eval(&cond, &facts), Truth::Indeterminate);

        facts.set("X", json!(false));
        assert_eq!(eval(&cond, &facts), Truth::False);

        facts.set("X", json!(true));
        assert_eq!(eval(&cond, &facts), Truth::True);
        assert_eq!(cond.terminal_objects(), vec![ObjectId::from("X")]);
    }

    #[test]
    fn test_fact_known_and_negation() {
        let mut facts = Blackboard::new();
        assert_eq!(eval(&FactKnown::new("Y"), &facts), Truth::False);
        facts.assert_fact(FactSource::User, "Y", json!("a"));
        assert_eq!(eval(&FactKnown::new("Y"), &facts), Truth::True);
        assert_eq!(
            eval(&Not::new(FactEquals::new("Y", "b")), &facts),
            Truth::True
        );
    }

    #[test]
    fn test_composite_terminal_objects() {
        let cond = And::new()
            .with(FactEquals::new("A", 1))
            .with(Or::new().with(FactKnown::new("B")).with(Always));
        let objects = cond.terminal_objects();
        assert_eq!(objects, vec![ObjectId::from("A"), ObjectId::from("B")]);
    }

    #[test]
    fn test_flow_state_guards_on_idle_session() {
        let facts = Blackboard::new();
        assert_eq!(eval(&NodeActive::new("Main", "Start"), &facts), Truth::False);
        assert_eq!(eval(&FlowProcessed::new("Main"), &facts), Truth::False);
        assert_eq!(
            eval(&NodeActive::new("Missing", "Start"), &facts),
            Truth::Indeterminate
        );
    }
}
