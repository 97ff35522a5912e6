//! Structural checks of conversion output: node and arc inventories per
//! BPMN construct, marking placement, and token-game behavior of the
//! resulting nets.

use bpmn2petri::bpmn::{
    Flow, FlowKind, GatewayKind, Node, NodeKind, Process, ProcessModel, TaskKind,
};
use bpmn2petri::petri::{ArcEnds, ArcId, PetriNet, PlaceId, TransitionId, TransitionKind};
use bpmn2petri::{convert, convert_with, ConvertError, ConvertOptions, XorStyle};

fn model(nodes: Vec<Node>, flows: Vec<Flow>) -> ProcessModel {
    ProcessModel {
        processes: vec![Process {
            id: "p".into(),
            name: "P".into(),
            nodes,
            flows,
        }],
        message_flows: vec![],
    }
}

fn task(id: &str, name: &str) -> Node {
    Node::new(id, name, NodeKind::Task(TaskKind::Abstract))
}

fn gateway(id: &str, kind: GatewayKind) -> Node {
    Node::new(id, id, NodeKind::Gateway(kind))
}

fn seq(id: &str, source: &str, target: &str) -> Flow {
    Flow::new(id, source, target, FlowKind::Sequence)
}

fn place_exists(net: &PetriNet, id: &str) -> bool {
    net.place(&PlaceId::from(id)).is_some()
}

fn transition_exists(net: &PetriNet, id: &str) -> bool {
    net.transition(&TransitionId::from(id)).is_some()
}

fn arc_exists(net: &PetriNet, source: &str, target: &str) -> bool {
    net.arc(&ArcId::from(format!("{source}{target}"))).is_some()
}

fn marked(net: &PetriNet) -> Vec<&str> {
    net.places()
        .filter(|p| p.tokens > 0)
        .map(|p| p.id.as_str())
        .collect()
}

/// Every arc endpoint must resolve to a live node of the right kind.
fn assert_consistent(net: &PetriNet) {
    for arc in net.arcs() {
        match arc.ends() {
            ArcEnds::PlaceToTransition(p, t) => {
                assert!(net.place(p).is_some(), "dangling place {p}");
                assert!(net.transition(t).is_some(), "dangling transition {t}");
            }
            ArcEnds::TransitionToPlace(t, p) => {
                assert!(net.transition(t).is_some(), "dangling transition {t}");
                assert!(net.place(p).is_some(), "dangling place {p}");
            }
        }
    }
}

fn fire(net: &mut PetriNet, id: &str) {
    assert!(net.fire(&TransitionId::from(id)), "cannot fire {id}");
}

#[test]
fn linear_process_converts_and_runs_to_completion() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            task("T", "Work"),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![seq("f1", "S", "T"), seq("f2", "T", "E")],
    );
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    // flow-interposed places plus the per-process start/end places
    assert_eq!(net.place_count(), 4);
    assert_eq!(net.transition_count(), 3);
    assert_eq!(marked(&net), vec!["start_p_p"]);

    fire(&mut net, "S");
    fire(&mut net, "T");
    fire(&mut net, "E");
    assert_eq!(marked(&net), vec!["end_p_p"]);
}

/// The scenario from the conversion walkthrough: a two-way exclusive choice
/// that reconverges. Under the default style both gateways collapse and are
/// then exploded into per-branch conflicting transitions.
#[test]
fn exclusive_choice_explodes_into_branch_conflict() {
    let m = model(
        vec![
            Node::new("A", "Start", NodeKind::StartEvent),
            gateway("X", GatewayKind::Exclusive),
            gateway("J", GatewayKind::Exclusive),
            Node::new("D", "End", NodeKind::EndEvent),
        ],
        vec![
            seq("f1", "A", "X"),
            seq("f2", "X", "J"),
            seq("f3", "X", "J"),
            seq("f4", "J", "D"),
        ],
    );
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    assert_eq!(net.place_count(), 6);
    assert_eq!(net.transition_count(), 6);
    assert_eq!(net.arc_count(), 12);

    // originals are gone, branch copies carry the tag
    assert!(!transition_exists(&net, "X"));
    assert!(!transition_exists(&net, "J"));
    for id in ["X_op_1", "X_op_2"] {
        let t = net.transition(&TransitionId::from(id)).unwrap();
        assert_eq!(t.kind, TransitionKind::XorSplit);
    }
    for id in ["J_op_1", "J_op_2"] {
        let t = net.transition(&TransitionId::from(id)).unwrap();
        assert_eq!(t.kind, TransitionKind::XorJoin);
    }

    assert_eq!(marked(&net), vec!["start_p_p"]);
    fire(&mut net, "A");
    // both branches compete for the token on f1; taking one disables the other
    assert!(net.can_fire(&TransitionId::from("X_op_1")));
    assert!(net.can_fire(&TransitionId::from("X_op_2")));
    fire(&mut net, "X_op_1");
    assert!(!net.can_fire(&TransitionId::from("X_op_2")));
    fire(&mut net, "J_op_1");
    fire(&mut net, "D");
    assert_eq!(marked(&net), vec!["end_p_p"]);
}

#[test]
fn expanded_exclusive_split_builds_choosing_chain() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            gateway("X", GatewayKind::Exclusive),
            task("B", "Left"),
            task("C", "Right"),
        ],
        vec![seq("f1", "S", "X"), seq("f2", "X", "B"), seq("f3", "X", "C")],
    );
    let net = convert_with(
        &m,
        ConvertOptions {
            timed_tasks: false,
            xor: XorStyle::Expanded,
        },
    )
    .unwrap();
    assert_consistent(&net);

    // the gateway itself is a choice place fed directly by the start event
    assert!(place_exists(&net, "X"));
    assert!(arc_exists(&net, "S", "X"));
    for branch in ["B", "C"] {
        assert!(transition_exists(&net, &format!("{branch}_middle_split")));
        assert!(place_exists(&net, &format!("{branch}_end_split")));
        assert!(arc_exists(&net, &format!("{branch}_end_split"), branch));
    }
    // consumed branch flows never reach generic flow conversion
    assert!(net.get_node("f2").is_none());
    assert!(net.get_node("f3").is_none());
}

/// A split feeding a join directly: the join-side branch whose source is an
/// exclusive split skips its Choosing/Chosen pair and reaches the join
/// place through a deferred link instead.
#[test]
fn expanded_join_skips_branches_sourced_from_exclusive_gateways() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            gateway("X1", GatewayKind::Exclusive),
            gateway("X2", GatewayKind::Exclusive),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![
            seq("f1", "S", "X1"),
            seq("f2", "X1", "X2"),
            seq("f3", "X1", "X2"),
            seq("f4", "X2", "E"),
        ],
    );
    let net = convert_with(
        &m,
        ConvertOptions {
            timed_tasks: false,
            xor: XorStyle::Expanded,
        },
    )
    .unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "X1"));
    assert!(place_exists(&net, "X2"));
    // no join-side pair for the skipped branches
    assert!(!place_exists(&net, "X1_middle_join"));
    assert!(!transition_exists(&net, "X1_end_join"));
    // the deferred place-to-place link got a midpoint transition
    assert!(transition_exists(&net, "X2_end_split_to_X2"));
}

#[test]
fn parallel_gateways_fork_and_synchronize() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            gateway("X", GatewayKind::Parallel),
            task("B", "Left"),
            task("C", "Right"),
            gateway("Y", GatewayKind::Parallel),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![
            seq("f1", "S", "X"),
            seq("f2", "X", "B"),
            seq("f3", "X", "C"),
            seq("f4", "B", "Y"),
            seq("f5", "C", "Y"),
            seq("f6", "Y", "E"),
        ],
    );
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    assert_eq!(
        net.transition(&TransitionId::from("X")).unwrap().kind,
        TransitionKind::AndSplit
    );
    assert_eq!(
        net.transition(&TransitionId::from("Y")).unwrap().kind,
        TransitionKind::AndJoin
    );

    fire(&mut net, "S");
    fire(&mut net, "X");
    assert_eq!(marked(&net).len(), 2);
    fire(&mut net, "B");
    // the join waits for both branches
    assert!(!net.can_fire(&TransitionId::from("Y")));
    fire(&mut net, "C");
    fire(&mut net, "Y");
    fire(&mut net, "E");
    assert_eq!(marked(&net), vec!["end_p_p"]);
}

#[test]
fn mixed_exclusive_becomes_place_transition_place() {
    let m = model(
        vec![
            task("A1", "In one"),
            task("A2", "In two"),
            gateway("X", GatewayKind::Exclusive),
            task("B1", "Out one"),
            task("B2", "Out two"),
        ],
        vec![
            seq("f1", "A1", "X"),
            seq("f2", "A2", "X"),
            seq("f3", "X", "B1"),
            seq("f4", "X", "B2"),
        ],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "X_j"));
    assert!(place_exists(&net, "X_s"));
    assert!(transition_exists(&net, "X_mid"));
    assert!(!transition_exists(&net, "X"));
    // mixed gateways are never exploded
    assert!(!transition_exists(&net, "X_mid_op_1"));
    assert!(arc_exists(&net, "A1", "X_j"));
    assert!(arc_exists(&net, "X_s", "B1"));
    // all four flows were consumed by the gateway rule
    for f in ["f1", "f2", "f3", "f4"] {
        assert!(net.get_node(f).is_none());
    }
}

#[test]
fn mixed_parallel_becomes_transition_place_transition() {
    let m = model(
        vec![
            task("A1", "In one"),
            task("A2", "In two"),
            gateway("X", GatewayKind::Parallel),
            task("B1", "Out one"),
            task("B2", "Out two"),
        ],
        vec![
            seq("f1", "A1", "X"),
            seq("f2", "A2", "X"),
            seq("f3", "X", "B1"),
            seq("f4", "X", "B2"),
        ],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);

    assert_eq!(
        net.transition(&TransitionId::from("X_j")).unwrap().kind,
        TransitionKind::AndJoin
    );
    assert_eq!(
        net.transition(&TransitionId::from("X_s")).unwrap().kind,
        TransitionKind::AndSplit
    );
    assert!(place_exists(&net, "X_mid"));
    // transition-to-transition wiring gets a midpoint place per branch
    assert!(place_exists(&net, "A1_to_X_j"));
    assert!(place_exists(&net, "X_s_to_B1"));
}

/// Three branches yield 2^3 - 3 - 1 = 4 combination transitions, indexed by
/// their position in the subset enumeration.
#[test]
fn inclusive_split_enumerates_branch_combinations() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            gateway("X", GatewayKind::Inclusive),
            task("B", "One"),
            task("C", "Two"),
            task("D", "Three"),
        ],
        vec![
            seq("f1", "S", "X"),
            seq("f2", "X", "B"),
            seq("f3", "X", "C"),
            seq("f4", "X", "D"),
        ],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "X"));
    for branch in ["B", "C", "D"] {
        assert!(transition_exists(&net, &format!("{branch}_middle_split")));
        assert!(place_exists(&net, &format!("{branch}_end_split")));
    }
    for present in ["X_s4", "X_s6", "X_s7", "X_s8"] {
        assert!(transition_exists(&net, present), "missing {present}");
    }
    for absent in ["X_s1", "X_s2", "X_s3", "X_s5", "X_s9"] {
        assert!(!transition_exists(&net, absent), "unexpected {absent}");
    }
    // a combination feeds every branch of its subset
    assert!(arc_exists(&net, "X", "X_s4"));
    assert!(arc_exists(&net, "X_s4", "B_end_split"));
    assert!(arc_exists(&net, "X_s4", "C_end_split"));
}

/// The join mirror of the split enumeration: Choosing places per incoming
/// branch, plus one synchronizing transition per branch subset of size two
/// or more.
#[test]
fn inclusive_join_enumerates_branch_combinations() {
    let m = model(
        vec![
            task("B", "One"),
            task("C", "Two"),
            task("D", "Three"),
            gateway("X", GatewayKind::Inclusive),
            task("E", "After"),
        ],
        vec![
            seq("f1", "B", "X"),
            seq("f2", "C", "X"),
            seq("f3", "D", "X"),
            seq("f4", "X", "E"),
        ],
    );
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "X"));
    for branch in ["B", "C", "D"] {
        assert!(place_exists(&net, &format!("{branch}_middle_join")));
        assert!(transition_exists(&net, &format!("{branch}_end_join")));
    }
    for present in ["X_j4", "X_j6", "X_j7", "X_j8"] {
        assert!(transition_exists(&net, present), "missing {present}");
    }
    for absent in ["X_j1", "X_j2", "X_j3", "X_j5", "X_j9"] {
        assert!(!transition_exists(&net, absent), "unexpected {absent}");
    }
    // a combination collects every branch of its subset into the join place
    assert!(arc_exists(&net, "B_middle_join", "X_j4"));
    assert!(arc_exists(&net, "C_middle_join", "X_j4"));
    assert!(arc_exists(&net, "X_j4", "X"));
    assert!(arc_exists(&net, "X", "E"));

    // two active branches synchronize through their pair combination
    fire(&mut net, "B");
    assert!(!net.can_fire(&TransitionId::from("X_j4")));
    fire(&mut net, "C");
    fire(&mut net, "X_j4");
    fire(&mut net, "E");
}

#[test]
fn mixed_inclusive_builds_join_and_split_sides() {
    let m = model(
        vec![
            task("A1", "In one"),
            task("A2", "In two"),
            gateway("X", GatewayKind::Inclusive),
            task("B1", "Out one"),
            task("B2", "Out two"),
        ],
        vec![
            seq("f1", "A1", "X"),
            seq("f2", "A2", "X"),
            seq("f3", "X", "B1"),
            seq("f4", "X", "B2"),
        ],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "X_join"));
    assert!(place_exists(&net, "X_split"));
    assert!(transition_exists(&net, "X_mid"));
    // with two branches each side gets exactly one pair combination
    assert!(transition_exists(&net, "X_j4"));
    assert!(transition_exists(&net, "X_s4"));
    assert!(arc_exists(&net, "A1_middle_join", "X_j4"));
    assert!(arc_exists(&net, "X_j4", "X_join"));
    assert!(arc_exists(&net, "X_split", "X_s4"));
    assert!(arc_exists(&net, "X_s4", "B1_end_split"));
    assert!(arc_exists(&net, "X_s4", "B2_end_split"));
    // all four flows were consumed by the gateway rule
    for f in ["f1", "f2", "f3", "f4"] {
        assert!(net.get_node(f).is_none());
    }
}

/// Converting the same model twice yields the same net, node for node and
/// arc for arc.
#[test]
fn conversion_is_deterministic() {
    let build = || {
        model(
            vec![
                Node::new("S", "Start", NodeKind::StartEvent),
                gateway("X", GatewayKind::Parallel),
                task("B", "Left"),
                task("C", "Right"),
                gateway("J", GatewayKind::Exclusive),
                Node::new("E", "End", NodeKind::EndEvent),
            ],
            vec![
                seq("f1", "S", "X"),
                seq("f2", "X", "B"),
                seq("f3", "X", "C"),
                seq("f4", "B", "J"),
                seq("f5", "C", "J"),
                seq("f6", "J", "E"),
            ],
        )
    };
    let first = convert(&build()).unwrap();
    let second = convert(&build()).unwrap();

    assert_eq!(first.place_count(), second.place_count());
    assert_eq!(first.transition_count(), second.transition_count());
    assert_eq!(first.arc_count(), second.arc_count());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn event_based_gateway_becomes_race_place() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            gateway("X", GatewayKind::EventBased),
            Node::new("C1", "Timer", NodeKind::IntermediateCatchEvent),
            Node::new("C2", "Message", NodeKind::IntermediateCatchEvent),
        ],
        vec![seq("f1", "S", "X"), seq("f2", "X", "C1"), seq("f3", "X", "C2")],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "X"));
    // flows stay with generic conversion: direct place/transition arcs
    assert!(arc_exists(&net, "S", "X"));
    assert!(arc_exists(&net, "X", "C1"));
    assert!(arc_exists(&net, "X", "C2"));
}

/// A mixed exclusive gateway branching into a collapsed join that only
/// exists later: the deferred branch must be wired before the join is
/// divided, so it comes out as one of the conflicting join copies instead
/// of being dropped.
#[test]
fn deferred_branch_into_collapsed_join_survives_explosion() {
    let m = model(
        vec![
            task("A1", "In one"),
            task("A2", "In two"),
            gateway("M", GatewayKind::Exclusive),
            task("B", "Other"),
            task("T1", "Side one"),
            task("T2", "Side two"),
            gateway("J", GatewayKind::Exclusive),
            Node::new("D", "End", NodeKind::EndEvent),
        ],
        vec![
            seq("f1", "A1", "M"),
            seq("f2", "A2", "M"),
            seq("f3", "M", "J"),
            seq("f4", "M", "B"),
            seq("f5", "T1", "J"),
            seq("f6", "T2", "J"),
            seq("f7", "J", "D"),
        ],
    );
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    // the join was divided, with the deferred branch as a third copy
    assert!(!transition_exists(&net, "J"));
    for id in ["J_op_1", "J_op_2", "J_op_3"] {
        let t = net.transition(&TransitionId::from(id)).unwrap();
        assert_eq!(t.kind, TransitionKind::XorJoin);
    }
    let split = net.place(&PlaceId::from("M_s")).unwrap();
    assert_eq!(split.out_arcs().len(), 2);
    assert!(arc_exists(&net, "M_s", "J_op_3"));
    assert!(arc_exists(&net, "J_op_3", "f7"));

    // the split place still offers a real choice between its branches
    fire(&mut net, "A1");
    fire(&mut net, "M_mid");
    assert!(net.can_fire(&TransitionId::from("B")));
    assert!(net.can_fire(&TransitionId::from("J_op_3")));
    fire(&mut net, "J_op_3");
    assert!(!net.can_fire(&TransitionId::from("B")));
    fire(&mut net, "D");
}

#[test]
fn event_based_gateway_with_multiple_inputs_is_left_unconverted() {
    let m = model(
        vec![
            task("A1", "One"),
            task("A2", "Two"),
            gateway("X", GatewayKind::EventBased),
            Node::new("C1", "Timer", NodeKind::IntermediateCatchEvent),
        ],
        vec![
            seq("f1", "A1", "X"),
            seq("f2", "A2", "X"),
            seq("f3", "X", "C1"),
        ],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);
    // the gateway is absent and its flows dangle harmlessly
    assert!(net.get_node("X").is_none());
}

/// Degenerate arities never materialize a race place: neither a pass-through
/// shape nor one with no inbound flow at all.
#[test]
fn degenerate_event_based_gateways_are_left_unconverted() {
    let m = model(
        vec![
            task("A", "Work"),
            gateway("E", GatewayKind::EventBased),
            Node::new("C", "Catch", NodeKind::IntermediateCatchEvent),
            gateway("E2", GatewayKind::EventBased),
            Node::new("C1", "Timer", NodeKind::IntermediateCatchEvent),
            Node::new("C2", "Message", NodeKind::IntermediateCatchEvent),
        ],
        vec![
            seq("f1", "A", "E"),
            seq("f2", "E", "C"),
            seq("f3", "E2", "C1"),
            seq("f4", "E2", "C2"),
        ],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);
    // one in, one out
    assert!(net.get_node("E").is_none());
    // no inbound flow
    assert!(net.get_node("E2").is_none());
}

#[test]
fn complex_gateway_is_a_hard_error() {
    let m = model(
        vec![
            task("A", "One"),
            gateway("X", GatewayKind::Complex),
            task("B", "Two"),
        ],
        vec![seq("f1", "A", "X"), seq("f2", "X", "B")],
    );
    match convert(&m) {
        Err(ConvertError::UnsupportedGateway { id }) => assert_eq!(id, "X"),
        other => panic!("expected unsupported gateway error, got {other:?}"),
    }
}

#[test]
fn flow_with_missing_endpoint_is_skipped() {
    let m = model(
        vec![Node::new("S", "Start", NodeKind::StartEvent), task("T", "Work")],
        vec![seq("f1", "S", "T"), seq("f2", "T", "ghost")],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);
    assert!(net.get_node("f2").is_none());
    assert!(place_exists(&net, "f1"));
}

/// An interrupting boundary event races the host task's end transition for
/// the token on the execution place.
#[test]
fn interrupting_boundary_event_races_task_completion() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            task("T", "Work"),
            Node::new(
                "B",
                "Timeout",
                NodeKind::BoundaryEvent {
                    attached_to: "T".into(),
                    interrupting: true,
                },
            ),
            task("H", "Handle"),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![seq("f1", "S", "T"), seq("f2", "T", "E"), seq("f3", "B", "H")],
    );
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    // the task splits into halves around its execution place
    assert_eq!(
        net.transition(&TransitionId::from("T")).unwrap().name,
        "Work_start"
    );
    assert!(transition_exists(&net, "T_end"));
    let link = net.place(&PlaceId::from("T_link")).unwrap();
    assert_eq!(link.out_arcs().len(), 2);

    assert!(transition_exists(&net, "B_int"));
    assert!(place_exists(&net, "B_out"));
    // the event's outgoing flow was re-pointed at the shared out place
    assert!(arc_exists(&net, "B_out", "H"));

    fire(&mut net, "S");
    fire(&mut net, "T");
    assert!(net.can_fire(&TransitionId::from("T_end")));
    assert!(net.can_fire(&TransitionId::from("B_int")));
    fire(&mut net, "B_int");
    assert!(!net.can_fire(&TransitionId::from("T_end")));
}

#[test]
fn boundary_event_without_outgoing_flow_gets_a_sink() {
    let m = model(
        vec![
            task("T", "Work"),
            Node::new(
                "B",
                "",
                NodeKind::BoundaryEvent {
                    attached_to: "T".into(),
                    interrupting: true,
                },
            ),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![seq("f1", "T", "E")],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);
    assert!(place_exists(&net, "B_sink"));
    assert!(!place_exists(&net, "B_out"));
    assert_eq!(
        net.transition(&TransitionId::from("B_int")).unwrap().name,
        "interrupt"
    );
}

#[test]
fn non_interrupting_boundary_event_is_ignored() {
    let m = model(
        vec![
            task("T", "Work"),
            Node::new(
                "B",
                "Reminder",
                NodeKind::BoundaryEvent {
                    attached_to: "T".into(),
                    interrupting: false,
                },
            ),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![seq("f1", "T", "E")],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);
    assert!(!transition_exists(&net, "B_int"));
    // without an interrupting event the task stays a single transition
    assert!(!place_exists(&net, "T_link"));
    assert!(transition_exists(&net, "T"));
}

#[test]
fn timed_tasks_expand_every_task() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            task("T", "Work"),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![seq("f1", "S", "T"), seq("f2", "T", "E")],
    );
    let net = convert_with(
        &m,
        ConvertOptions {
            timed_tasks: true,
            xor: XorStyle::Collapsed,
        },
    )
    .unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "T_link"));
    assert!(transition_exists(&net, "T_end"));
    // the rerouted outgoing flow now leaves the end half
    assert!(arc_exists(&net, "T_end", "f2"));
}

/// A task with nothing downstream keeps its single transition, but the
/// start-half name is applied before the expansion is abandoned.
#[test]
fn timed_task_without_outgoing_flows_stays_whole() {
    let m = model(vec![task("T", "Work")], vec![]);
    let net = convert_with(
        &m,
        ConvertOptions {
            timed_tasks: true,
            xor: XorStyle::Collapsed,
        },
    )
    .unwrap();
    assert!(!place_exists(&net, "T_link"));
    assert!(!transition_exists(&net, "T_end"));
    assert_eq!(
        net.transition(&TransitionId::from("T")).unwrap().name,
        "Work_start"
    );
}

#[test]
fn artifacts_are_routed_around() {
    let m = model(
        vec![
            task("A", "Produce"),
            Node::new("Doc", "Document", NodeKind::Artifact),
            task("B", "Consume"),
        ],
        vec![
            Flow::new("a1", "A", "Doc", FlowKind::Association),
            Flow::new("a2", "Doc", "B", FlowKind::Association),
        ],
    );
    let net = convert(&m).unwrap();
    assert_consistent(&net);

    assert!(net.get_node("Doc").is_none());
    // the synthesized flow connects the artifact's neighbors directly
    assert!(place_exists(&net, "A_to_B"));
    assert!(arc_exists(&net, "A", "A_to_B"));
    assert!(arc_exists(&net, "A_to_B", "B"));
    assert!(net.get_node("a1").is_none());
}

/// A message-triggered start waits for the message, not the initial token,
/// and a message-sending end keeps the process alive until delivery.
#[test]
fn message_flows_decouple_start_and_end_events() {
    let m = ProcessModel {
        processes: vec![
            Process {
                id: "p1".into(),
                name: "Sender".into(),
                nodes: vec![
                    Node::new("S1", "Start", NodeKind::StartEvent),
                    Node::new("E1", "Send done", NodeKind::EndEvent),
                ],
                flows: vec![seq("f1", "S1", "E1")],
            },
            Process {
                id: "p2".into(),
                name: "Receiver".into(),
                nodes: vec![
                    Node::new("S2", "On message", NodeKind::StartEvent),
                    Node::new("E2", "End", NodeKind::EndEvent),
                ],
                flows: vec![seq("f2", "S2", "E2")],
            },
        ],
        message_flows: vec![Flow::new("m1", "E1", "S2", FlowKind::Message)],
    };
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    assert!(place_exists(&net, "start_p_p1"));
    assert!(!place_exists(&net, "start_p_p2"));
    assert!(!place_exists(&net, "end_p_p1"));
    assert!(place_exists(&net, "end_p_p2"));
    // the message flow itself is an interposed place between transitions
    assert!(place_exists(&net, "m1"));
    assert_eq!(marked(&net), vec!["start_p_p1"]);

    fire(&mut net, "S1");
    fire(&mut net, "E1");
    fire(&mut net, "S2");
    fire(&mut net, "E2");
    assert_eq!(marked(&net), vec!["end_p_p2"]);
}

#[test]
fn multiple_processes_get_unified_start_and_end() {
    let m = ProcessModel {
        processes: vec![
            Process {
                id: "p1".into(),
                name: "One".into(),
                nodes: vec![
                    Node::new("S1", "Start", NodeKind::StartEvent),
                    Node::new("E1", "End", NodeKind::EndEvent),
                ],
                flows: vec![seq("f1", "S1", "E1")],
            },
            Process {
                id: "p2".into(),
                name: "Two".into(),
                nodes: vec![
                    Node::new("S2", "Start", NodeKind::StartEvent),
                    Node::new("E2", "End", NodeKind::EndEvent),
                ],
                flows: vec![seq("f2", "S2", "E2")],
            },
        ],
        message_flows: vec![],
    };
    let mut net = convert(&m).unwrap();
    assert_consistent(&net);

    for id in ["start_p", "start_p_p1", "start_p_p2", "end_p_p1", "end_p_p2", "end_p"] {
        assert!(place_exists(&net, id), "missing {id}");
    }
    assert!(transition_exists(&net, "start_t"));
    assert!(transition_exists(&net, "end_t"));
    // only the global source carries the initial token
    assert_eq!(marked(&net), vec!["start_p"]);

    fire(&mut net, "start_t");
    fire(&mut net, "S1");
    fire(&mut net, "E1");
    fire(&mut net, "S2");
    fire(&mut net, "E2");
    fire(&mut net, "end_t");
    assert_eq!(marked(&net), vec!["end_p"]);
}

#[test]
fn converted_net_serializes_and_renders() {
    let m = model(
        vec![
            Node::new("S", "Start", NodeKind::StartEvent),
            task("T", "Work"),
            Node::new("E", "End", NodeKind::EndEvent),
        ],
        vec![seq("f1", "S", "T"), seq("f2", "T", "E")],
    );
    let net = convert(&m).unwrap();

    let json = serde_json::to_string(&net).unwrap();
    assert!(json.contains("start_p_p"));

    let rendered = net.to_string();
    assert!(rendered.contains("Places:"));
    assert!(rendered.contains("Transitions:"));
    assert!(rendered.contains("Arcs:"));
}
