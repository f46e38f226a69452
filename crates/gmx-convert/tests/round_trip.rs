//! End-to-end conversion tests: parse, import, export, re-import.

use gmx_convert::{export_network, import_case, parse_case, write_case_string};
use gmx_core::{Attachment, Topology};

/// One node-breaker substation (load and generator colliding on node 1,
/// transformer on node 3, busbar node 2) plus a plain bus on the other
/// side of the transformer.
const FIXTURE: &str = "\
100.0, 0 / round trip fixture
BUS DATA FOLLOWS
100, 'A', 230.0, 2, 1.02, -1.5
200, 'B', 110.0, 1, 1.0, 0.0
END OF BUS DATA
LOAD DATA FOLLOWS
100, '1', 1, 50.0, 10.0
END OF LOAD DATA
GENERATOR DATA FOLLOWS
100, '1', 1, 80.0, 20.0, 1.02, 0, 0
END OF GENERATOR DATA
TRANSFORMER DATA FOLLOWS
100, 200, 0, '1', 'T1', 1, 1, 1, 1, 0.002, -0.015, 0.01, 0.05, 100.0, 0, 0, 100.0, 0, 0, 100.0, 1.0, 0, 0, 1.1, 0.9, 1, 0, 1.05, 0, 0, 1.1, 0.9, 1, 0, 1.0, 0, 0, 1.1, 0.9, 1, 0
END OF TRANSFORMER DATA
SUBSTATION DATA FOLLOWS
S, 1, 'S1'
N, 1, '', 100, 1.02, -1.5
N, 2, '', 100,,
N, 3, '', 100,,
W, 1, 2, '1', 1, 1
W, 2, 3, '1', 1, 0
T, 100, 1, 'L', '1', 0, 0
T, 100, 1, 'M', '1', 0, 0
T, 100, 3, '2', '1', 200, 0
END OF SUBSTATION DATA
";

#[test]
fn test_import_builds_expected_topology() {
    let (case, diag) = parse_case(FIXTURE).unwrap();
    assert!(!diag.has_issues(), "{}", diag.summary());
    let (network, conv) = import_case(&case).unwrap();

    assert_eq!(conv.stats.substations_valid, 1);
    assert!(!conv.diagnostics.has_errors());

    let vl = network
        .voltage_levels
        .iter()
        .find(|vl| vl.is_node_breaker())
        .unwrap();
    let Topology::NodeBreaker(nb) = &vl.topology else {
        unreachable!();
    };
    // generator collided with the load on node 1: one synthetic node
    assert_eq!(nb.nodes.len(), 4);
    assert_eq!(nb.switches.len(), 2);
    assert_eq!(nb.internal_connections.len(), 1);
    assert_eq!(nb.busbar_sections.len(), 1);
    assert_eq!(conv.stats.synthetic_nodes, 1);

    // load kept the declared node, generator moved to the fresh one
    let Attachment::Node { node: load_node, .. } = &network.loads[0].attachment else {
        panic!("load should attach to a node");
    };
    let Attachment::Node { node: gen_node, .. } = &network.generators[0].attachment else {
        panic!("generator should attach to a node");
    };
    assert_ne!(load_node, gen_node);
}

#[test]
fn test_topology_survives_a_round_trip() {
    let (case, _) = parse_case(FIXTURE).unwrap();
    let (network1, _) = import_case(&case).unwrap();
    let (exported, conv) = export_network(&network1).unwrap();
    assert!(!conv.diagnostics.has_errors());

    // the internal-connection island collapsed onto its representative
    let sub = &exported.substations[0];
    assert_eq!(sub.nodes.len(), 3);
    assert_eq!(sub.switching_devices.len(), 2);
    let open_states: Vec<bool> = sub.switching_devices.iter().map(|s| s.open).collect();
    assert_eq!(open_states.iter().filter(|o| **o).count(), 1);

    // the flat case re-imports to an isomorphic model
    let (network2, conv2) = import_case(&exported).unwrap();
    assert!(!conv2.diagnostics.has_errors());
    let s1 = network1.stats();
    let s2 = network2.stats();
    assert_eq!(s1.num_nodes, s2.num_nodes);
    assert_eq!(s1.num_switches, s2.num_switches);
    assert_eq!(s1.num_internal_connections, s2.num_internal_connections);
    assert_eq!(s1.num_busbar_sections, s2.num_busbar_sections);
    assert_eq!(s1.num_loads, s2.num_loads);
    assert_eq!(s1.num_generators, s2.num_generators);
    assert_eq!(s1.num_transformers, s2.num_transformers);
}

#[test]
fn test_transformer_parameters_survive_a_round_trip() {
    let (case, _) = parse_case(FIXTURE).unwrap();
    let (network1, _) = import_case(&case).unwrap();
    let (exported, _) = export_network(&network1).unwrap();
    let (network2, _) = import_case(&exported).unwrap();

    let t1 = &network1.transformers_2w[0];
    let t2 = &network2.transformers_2w[0];
    let close = |a: f64, b: f64| {
        let scale = a.abs().max(b.abs()).max(1e-30);
        (a - b).abs() / scale < 1e-9
    };
    assert!(close(t1.r.value(), t2.r.value()));
    assert!(close(t1.x.value(), t2.x.value()));
    assert!(close(t1.g.value(), t2.g.value()));
    assert!(close(t1.b.value(), t2.b.value()));

    let tc1 = t1.tap_changer.as_ref().unwrap();
    let tc2 = t2.tap_changer.as_ref().unwrap();
    assert!(close(tc1.current_step().ratio, tc2.current_step().ratio));
    assert_eq!(
        tc1.current_step().angle.value(),
        tc2.current_step().angle.value()
    );
}

#[test]
fn test_conversion_is_deterministic() {
    // the same input must serialize to the same bytes, run after run
    let run = || {
        let (case, _) = parse_case(FIXTURE).unwrap();
        let (network, _) = import_case(&case).unwrap();
        let (exported, _) = export_network(&network).unwrap();
        write_case_string(&exported)
    };
    let text1 = run();
    let text2 = run();
    assert_eq!(text1, text2);

    // and the serialized form parses back without loss of structure
    let (reparsed, diag) = parse_case(&text1).unwrap();
    assert!(!diag.has_issues(), "{}", diag.summary());
    assert_eq!(reparsed.substations.len(), 1);
    assert_eq!(reparsed.substations[0].terminals.len(), 3);
}

#[test]
fn test_invalid_substation_falls_back_to_bus_breaker() {
    // same node id declared under two buses
    let text = "\
100.0, 0 / invalid substation
BUS DATA FOLLOWS
100, 'A', 230.0, 1, 1.0, 0.0
200, 'B', 230.0, 1, 1.0, 0.0
END OF BUS DATA
SUBSTATION DATA FOLLOWS
S, 1, 'S1'
N, 1, '', 100,,
N, 1, '', 200,,
END OF SUBSTATION DATA
";
    let (case, _) = parse_case(text).unwrap();
    let (network, conv) = import_case(&case).unwrap();

    assert_eq!(conv.stats.substations_valid, 0);
    assert!(conv.diagnostics.has_warnings());
    // one bus-breaker voltage level per declared bus
    assert_eq!(network.voltage_levels.len(), 2);
    for vl in &network.voltage_levels {
        assert!(!vl.is_node_breaker());
        let Topology::BusBreaker(bb) = &vl.topology else {
            unreachable!();
        };
        assert_eq!(bb.buses.len(), 1);
    }
}
