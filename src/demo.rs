use std::sync::Arc;

use serde_json::json;

use flux_core::config::AppConfig;
use flux_engine::{
    FactEquals, FlowBuilder, FlowSet, FlowSetBuilder, FluxSolver, Session, SetFact,
};

/// Demonstration knowledge base: the `Main` flow asks for `X`, the
/// `Followup` flow commits a snapshot once `fever` is confirmed.
pub fn demo_flows(config: &AppConfig) -> flux_core::Result<FlowSet> {
    FlowSetBuilder::new()
        .with_consistency_check(config.knowledge.check_consistency)
        .add(
            FlowBuilder::new("Main")
                .autostart()
                .start("S")
                .action("A", SetFact::new("asked", true))
                .exit("E")
                .always("S", "A")
                .edge("A", "E", FactEquals::new("X", true)),
        )
        .add(
            FlowBuilder::new("Followup")
                .autostart()
                .start("S")
                .snapshot("Commit")
                .action("Treat", SetFact::new("treatment", "rest"))
                .exit("Done")
                .edge("S", "Commit", FactEquals::new("fever", true))
                .always("Commit", "Treat")
                .always("Treat", "Done"),
        )
        .build()
}

pub fn run_demo(config: &AppConfig, answer: bool) -> flux_core::Result<()> {
    let flows = Arc::new(demo_flows(config)?);
    let solver = FluxSolver::new(flows, config.solver.clone());
    let mut session = solver.open_session();
    print_state("after init", &solver, &session);

    session.facts_mut().set("X", json!(answer));
    solver.run_cycle(&mut session);
    print_state(&format!("after X = {answer}"), &solver, &session);

    session.facts_mut().set("fever", json!(true));
    solver.run_cycle(&mut session);
    print_state("after fever = true", &solver, &session);

    // Committed results survive the retraction of the answer that led to them
    session.facts_mut().set("fever", json!(false));
    solver.run_cycle(&mut session);
    print_state("after fever = false", &solver, &session);
    Ok(())
}

fn print_state(label: &str, solver: &FluxSolver, session: &Session) {
    let flows = solver.flows();
    println!("== {label}");
    for run in session.state().runs() {
        let names: Vec<String> = run
            .active_nodes()
            .into_iter()
            .map(|id| {
                let node = flows.node(id);
                format!("{}/{}", flows.flow(node.flow()).name(), node.name())
            })
            .collect();
        println!("  {}: {}", run.id(), names.join(", "));
    }
    for (object, value) in session.facts().snapshot_values() {
        println!("  {object} = {value}");
    }
}
