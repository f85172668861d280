use serde_json::json;

use flux_engine::{FactEquals, FlowBuilder, FlowSetBuilder};
use flux_test_utils::{ActionLog, Harness, Hook, RecordingAction};

fn chain(log: &ActionLog) -> FlowSetBuilder {
    FlowSetBuilder::new().add(
        FlowBuilder::new("Main")
            .autostart()
            .start("S")
            .action("A", RecordingAction::new("A", log))
            .action("B", RecordingAction::new("B", log))
            .exit("Exit")
            .edge("S", "A", FactEquals::new("Q", "yes"))
            .always("A", "B")
            .edge("B", "Exit", FactEquals::new("never", true)),
    )
}

#[test]
fn test_retraction_is_transitive() {
    let log = ActionLog::new();
    let mut h = Harness::new(chain(&log));

    h.set("Q", json!("yes"));
    assert!(h.active("Main", "A"));
    assert!(h.active("Main", "B"));
    assert_eq!(h.fact("B.done"), Some(json!(true)));

    h.set("Q", json!("no"));
    assert!(!h.active("Main", "A"));
    assert!(!h.active("Main", "B"));
    assert!(!h.active("Main", "Exit"));
    assert_eq!(log.undos("A"), 1);
    assert_eq!(log.undos("B"), 1);
    assert_eq!(h.fact("A.done"), None);
    assert_eq!(h.fact("B.done"), None);
}

#[test]
fn test_undo_runs_upstream_first() {
    let log = ActionLog::new();
    let mut h = Harness::new(chain(&log));
    h.set("Q", json!("yes"));
    log.clear();

    h.set("Q", json!("no"));
    assert_eq!(
        log.entries(),
        vec![("A".to_string(), Hook::Undo), ("B".to_string(), Hook::Undo)]
    );
}

#[test]
fn test_retracted_node_is_not_reentered_in_same_run() {
    let log = ActionLog::new();
    let mut h = Harness::new(chain(&log));

    h.set("Q", json!("yes"));
    h.set("Q", json!("no"));
    h.set("Q", json!("yes"));

    assert!(!h.active("Main", "A"));
    assert_eq!(log.executions("A"), 1);
    let run = h.single_run();
    let s_a = h.edge("Main", "S", "A");
    assert!(!h.solver.has_fired(&h.session, s_a, run).unwrap());
}

#[test]
fn test_alternate_support_keeps_node_active() {
    let log = ActionLog::new();
    let flows = FlowSetBuilder::new().add(
        FlowBuilder::new("Main")
            .autostart()
            .start("S")
            .action("A", RecordingAction::new("A", &log))
            .action("B", RecordingAction::new("B", &log))
            .action("C", RecordingAction::new("C", &log))
            .edge("S", "A", FactEquals::new("P", true))
            .edge("S", "B", FactEquals::new("Q", true))
            .always("A", "C")
            .always("B", "C"),
    );
    let mut h = Harness::new(flows);

    h.set("P", json!(true));
    h.set("Q", json!(true));
    assert_eq!(log.executions("C"), 1);

    h.clear("P");
    assert!(!h.active("Main", "A"));
    assert!(h.active("Main", "B"));
    assert!(h.active("Main", "C"));
    assert_eq!(log.undos("C"), 0);

    h.clear("Q");
    assert!(!h.active("Main", "C"));
    assert_eq!(log.undos("C"), 1);
}

#[test]
fn test_back_edge_does_not_reenter() {
    let log = ActionLog::new();
    let flows = FlowSetBuilder::new().add(
        FlowBuilder::new("Main")
            .autostart()
            .start("S")
            .action("A", RecordingAction::new("A", &log))
            .action("B", RecordingAction::new("B", &log))
            .edge("S", "A", FactEquals::new("go", true))
            .always("A", "B")
            .always("B", "A"),
    );
    let mut h = Harness::new(flows);

    h.set("go", json!(true));
    assert!(h.active("Main", "A"));
    assert!(h.active("Main", "B"));
    assert_eq!(log.executions("A"), 1);
    assert_eq!(log.executions("B"), 1);
    let b_a = h.edge("Main", "B", "A");
    assert!(h.solver.is_edge_active(&h.session, b_a).unwrap());
}

#[test]
fn test_loop_does_not_keep_itself_alive() {
    let log = ActionLog::new();
    let flows = FlowSetBuilder::new().add(
        FlowBuilder::new("Main")
            .autostart()
            .start("S")
            .action("A", RecordingAction::new("A", &log))
            .action("B", RecordingAction::new("B", &log))
            .edge("S", "A", FactEquals::new("go", true))
            .always("A", "B")
            .always("B", "A"),
    );
    let mut h = Harness::new(flows);

    h.set("go", json!(true));
    h.set("go", json!(false));

    assert!(!h.active("Main", "A"));
    assert!(!h.active("Main", "B"));
    assert_eq!(log.undos("A"), 1);
    assert_eq!(log.undos("B"), 1);
    let run = h.single_run();
    assert!(h.solver.active_edges(&h.session, run).unwrap().is_empty());
}

#[test]
fn test_start_node_is_never_retracted() {
    let log = ActionLog::new();
    let mut h = Harness::new(chain(&log));

    h.set("Q", json!("yes"));
    h.set("Q", json!("no"));
    h.clear("Q");

    assert!(h.active("Main", "S"));
}

#[test]
fn test_retracting_call_site_undoes_callee() {
    let log = ActionLog::new();
    let flows = FlowSetBuilder::new()
        .add(
            FlowBuilder::new("Main")
                .autostart()
                .start("S")
                .composed("Call", "Sub", "Begin")
                .exit("Done")
                .edge("S", "Call", FactEquals::new("go", true))
                .always("Call", "Done"),
        )
        .add(
            FlowBuilder::new("Sub")
                .start("Begin")
                .action("Work", RecordingAction::new("Work", &log))
                .exit("End")
                .always("Begin", "Work")
                .always("Work", "End"),
        );
    let mut h = Harness::new(flows);

    h.set("go", json!(true));
    assert!(h.active("Sub", "End"));
    assert!(h.active("Main", "Done"));

    h.clear("go");
    assert!(!h.active("Main", "Call"));
    assert!(!h.active("Sub", "Begin"));
    assert!(!h.active("Sub", "Work"));
    assert!(!h.active("Sub", "End"));
    assert!(!h.active("Main", "Done"));
    assert_eq!(log.undos("Work"), 1);
    assert_eq!(h.fact("Work.done"), None);
}

#[test]
fn test_wide_lattice_retracts_quickly() {
    const WIDTH: usize = 3;
    const DEPTH: usize = 40;

    let log = ActionLog::new();
    let name = |layer: usize, i: usize| format!("L{layer}_{i}");
    let mut flow = FlowBuilder::new("Main").autostart().start("S");
    for layer in 0..DEPTH {
        for i in 0..WIDTH {
            flow = flow.action(name(layer, i), RecordingAction::new(name(layer, i), &log));
        }
    }
    for i in 0..WIDTH {
        flow = flow.edge("S", name(0, i), FactEquals::new("x", true));
    }
    for layer in 1..DEPTH {
        for from in 0..WIDTH {
            for to in 0..WIDTH {
                flow = flow.always(name(layer - 1, from), name(layer, to));
            }
        }
    }
    let mut h = Harness::new(FlowSetBuilder::new().add(flow));

    h.set("x", json!(true));
    assert!(h.active("Main", &name(DEPTH - 1, 0)));

    let started = std::time::Instant::now();
    h.set("x", json!(false));
    assert!(started.elapsed() < std::time::Duration::from_secs(10));

    for layer in 0..DEPTH {
        for i in 0..WIDTH {
            assert!(!h.active("Main", &name(layer, i)));
            assert_eq!(log.undos(&name(layer, i)), 1);
        }
    }
}
