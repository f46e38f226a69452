//! Writer for the flat tabular exchange format.
//!
//! Serializes a [`RawCase`] into the same section layout the reader
//! parses. Floats print with Rust's shortest round-trip representation so
//! writing and re-reading a case is lossless, and the same case always
//! serializes to the same bytes.

use std::fs;
use std::path::Path;

use anyhow::Context;
use gmx_core::GmxResult;

use crate::records::{equipment_kind_code, RawCase, SwitchingDeviceKind};

/// Serialize a case to a string.
pub fn write_case_string(case: &RawCase) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{}, {} / {}\n",
        case.ident.sbase.value(),
        i32::from(case.ident.ignore_nominal_voltages),
        case.ident.title,
    ));

    out.push_str("BUS DATA FOLLOWS\n");
    for bus in &case.buses {
        out.push_str(&format!(
            "{}, '{}', {}, {}, {}, {}\n",
            bus.num,
            bus.name,
            bus.base_kv.value(),
            bus.bus_type.code(),
            bus.vm.value(),
            bus.va.value(),
        ));
    }
    out.push_str("END OF BUS DATA\n");

    out.push_str("LOAD DATA FOLLOWS\n");
    for load in &case.loads {
        out.push_str(&format!(
            "{}, '{}', {}, {}, {}\n",
            load.bus,
            load.id,
            i32::from(load.in_service),
            load.p.value(),
            load.q.value(),
        ));
    }
    out.push_str("END OF LOAD DATA\n");

    out.push_str("GENERATOR DATA FOLLOWS\n");
    for gen in &case.generators {
        out.push_str(&format!(
            "{}, '{}', {}, {}, {}, {}, {}, {}\n",
            gen.bus,
            gen.id,
            i32::from(gen.in_service),
            gen.p.value(),
            gen.q.value(),
            gen.voltage_setpoint.value(),
            gen.regulated_bus.map(|b| b.value()).unwrap_or(0),
            gen.regulated_node.map(|n| n.value()).unwrap_or(0),
        ));
    }
    out.push_str("END OF GENERATOR DATA\n");

    out.push_str("TRANSFORMER DATA FOLLOWS\n");
    for t in &case.transformers {
        out.push_str(&format!(
            "{}, {}, {}, '{}', '{}', {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
            t.bus1,
            t.bus2,
            t.bus3.map(|b| b.value()).unwrap_or(0),
            t.circuit,
            t.name,
            i32::from(t.in_service),
            t.cw,
            t.cz,
            t.cm,
            t.mag1,
            t.mag2,
            t.r12,
            t.x12,
            t.sbase12.value(),
            t.r23,
            t.x23,
            t.sbase23.value(),
            t.r31,
            t.x31,
            t.sbase31.value(),
        ));
        for w in &t.windings {
            out.push_str(&format!(
                ", {}, {}, {}, {}, {}, {}, {}",
                w.windv,
                w.nomv.value(),
                w.ang.value(),
                w.rma,
                w.rmi,
                w.ntp,
                w.cod,
            ));
        }
        out.push('\n');
    }
    out.push_str("END OF TRANSFORMER DATA\n");

    out.push_str("SUBSTATION DATA FOLLOWS\n");
    for sub in &case.substations {
        out.push_str(&format!("S, {}, '{}'\n", sub.id, sub.name));
        for node in &sub.nodes {
            let vm = node.vm.map(|v| v.value().to_string()).unwrap_or_default();
            let va = node.va.map(|v| v.value().to_string()).unwrap_or_default();
            out.push_str(&format!(
                "N, {}, '{}', {}, {}, {}\n",
                node.id, node.name, node.bus, vm, va,
            ));
        }
        for sw in &sub.switching_devices {
            let kind = match sw.kind {
                SwitchingDeviceKind::Breaker => 1,
                SwitchingDeviceKind::Disconnector => 2,
            };
            out.push_str(&format!(
                "W, {}, {}, '{}', {}, {}\n",
                sw.node1,
                sw.node2,
                sw.circuit,
                kind,
                i32::from(!sw.open),
            ));
        }
        for term in &sub.terminals {
            out.push_str(&format!(
                "T, {}, {}, '{}', '{}', {}, {}\n",
                term.bus,
                term.node,
                equipment_kind_code(term.kind),
                term.equipment_id,
                term.other_bus_1.map(|b| b.value()).unwrap_or(0),
                term.other_bus_2.map(|b| b.value()).unwrap_or(0),
            ));
        }
    }
    out.push_str("END OF SUBSTATION DATA\n");

    out
}

/// Write a case to a file.
pub fn write_case_file(path: &Path, case: &RawCase) -> GmxResult<()> {
    fs::write(path, write_case_string(case))
        .with_context(|| format!("writing case file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_case;
    use crate::records::tests::two_winding_fixture;
    use crate::records::*;
    use gmx_core::{BusNum, Degrees, Kilovolts, Megavars, Megawatts, NodeId, PerUnit, SubstationId};

    fn sample_case() -> RawCase {
        RawCase {
            ident: CaseIdent {
                sbase: gmx_core::MegavoltAmperes(100.0),
                ignore_nominal_voltages: false,
                title: "writer test".into(),
            },
            buses: vec![BusRecord {
                num: BusNum::new(100),
                name: "STATION A".into(),
                base_kv: Kilovolts(230.0),
                bus_type: BusTypeCode::Slack,
                vm: PerUnit(1.0215),
                va: Degrees(-1.5),
            }],
            loads: vec![LoadRecord {
                bus: BusNum::new(100),
                id: "1".into(),
                in_service: true,
                p: Megawatts(50.5),
                q: Megavars(-10.25),
            }],
            generators: vec![],
            transformers: vec![two_winding_fixture()],
            substations: vec![SubstationRecord {
                id: SubstationId::new(1),
                name: "S1".into(),
                nodes: vec![NodeRecord {
                    id: NodeId::new(1),
                    name: String::new(),
                    bus: BusNum::new(100),
                    vm: None,
                    va: None,
                }],
                switching_devices: vec![],
                terminals: vec![TerminalRecord {
                    bus: BusNum::new(100),
                    node: NodeId::new(1),
                    kind: gmx_core::EquipmentKind::Load,
                    equipment_id: "1".into(),
                    other_bus_1: None,
                    other_bus_2: None,
                }],
            }],
        }
    }

    #[test]
    fn test_write_then_read_is_lossless() {
        let case = sample_case();
        let text = write_case_string(&case);
        let (reread, diag) = parse_case(&text).unwrap();
        assert!(!diag.has_issues(), "{}", diag.summary());

        assert_eq!(reread.ident.title, "writer test");
        assert_eq!(reread.buses[0].vm, PerUnit(1.0215));
        assert_eq!(reread.loads[0].q, Megavars(-10.25));
        assert_eq!(reread.transformers[0].x12, case.transformers[0].x12);
        assert_eq!(reread.substations[0].nodes[0].vm, None);
        assert_eq!(
            reread.substations[0].terminals[0].kind,
            gmx_core::EquipmentKind::Load
        );
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let case = sample_case();
        assert_eq!(write_case_string(&case), write_case_string(&case));
    }

    #[test]
    fn test_unwritable_path_error_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("case.gmx");
        let err = write_case_file(&path, &sample_case()).unwrap_err();
        assert!(err.to_string().contains("case.gmx"), "{}", err);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.gmx");
        let case = sample_case();
        write_case_file(&path, &case).unwrap();
        let (reread, _) = crate::reader::read_case_file(&path).unwrap();
        assert_eq!(reread.buses.len(), 1);
        assert_eq!(reread.substations.len(), 1);
    }
}
