//! Section-based reader for the flat tabular exchange format.
//!
//! The file is line-oriented: a header line, then `<SECTION> DATA
//! FOLLOWS` ... `END OF <SECTION> DATA` blocks. Everything after `/` on
//! a line is a comment, except on the header line where it carries the
//! case title. Substation blocks use prefixed sub-lines: `S,` starts a
//! substation, `N,`/`W,`/`T,` append nodes, switching devices and
//! terminals to it.
//!
//! Malformed lines are skipped with a warning; only a missing header or
//! unreadable file fails the whole read.

use std::fs;
use std::path::Path;

use anyhow::Context;
use gmx_core::{
    BusNum, Degrees, Diagnostics, GmxError, GmxResult, Kilovolts, Megavars, MegavoltAmperes,
    Megawatts, NodeId, PerUnit, SubstationId,
};
use tracing::debug;

use crate::records::{
    equipment_kind_from_code, BusRecord, BusTypeCode, CaseIdent, GeneratorRecord, LoadRecord,
    NodeRecord, RawCase, SubstationRecord, SwitchingDeviceKind, SwitchingDeviceRecord,
    TerminalRecord, TransformerRecord, WindingRecord,
};

#[derive(PartialEq, Eq)]
enum Section {
    None,
    Bus,
    Load,
    Generator,
    Transformer,
    Substation,
}

/// Read and parse a case file.
pub fn read_case_file(path: &Path) -> GmxResult<(RawCase, Diagnostics)> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading case file {}", path.display()))?;
    parse_case(&contents)
}

/// Parse a case from its text contents.
pub fn parse_case(contents: &str) -> GmxResult<(RawCase, Diagnostics)> {
    let mut diag = Diagnostics::new();
    let mut case = RawCase::default();
    let mut section = Section::None;
    let mut header_seen = false;

    for (lineno, raw_line) in contents.lines().enumerate() {
        let lineno = lineno + 1;
        if !header_seen {
            let significant = raw_line.split('/').next().unwrap_or("").trim();
            if significant.is_empty() {
                continue;
            }
            case.ident = parse_header(raw_line).ok_or_else(|| {
                GmxError::Parse(format!("malformed case header at line {}", lineno))
            })?;
            header_seen = true;
            continue;
        }

        let line = raw_line.split('/').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        match line.to_ascii_uppercase().as_str() {
            "BUS DATA FOLLOWS" => {
                section = Section::Bus;
                continue;
            }
            "END OF BUS DATA" => {
                section = Section::None;
                continue;
            }
            "LOAD DATA FOLLOWS" => {
                section = Section::Load;
                continue;
            }
            "END OF LOAD DATA" => {
                section = Section::None;
                continue;
            }
            "GENERATOR DATA FOLLOWS" => {
                section = Section::Generator;
                continue;
            }
            "END OF GENERATOR DATA" => {
                section = Section::None;
                continue;
            }
            "TRANSFORMER DATA FOLLOWS" => {
                section = Section::Transformer;
                continue;
            }
            "END OF TRANSFORMER DATA" => {
                section = Section::None;
                continue;
            }
            "SUBSTATION DATA FOLLOWS" => {
                section = Section::Substation;
                continue;
            }
            "END OF SUBSTATION DATA" => {
                section = Section::None;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Bus => match parse_bus_line(line) {
                Some(bus) => case.buses.push(bus),
                None => diag.add_warning_at_line("parse", "skipping malformed bus line", lineno),
            },
            Section::Load => match parse_load_line(line) {
                Some(load) => case.loads.push(load),
                None => diag.add_warning_at_line("parse", "skipping malformed load line", lineno),
            },
            Section::Generator => match parse_generator_line(line) {
                Some(gen) => case.generators.push(gen),
                None => {
                    diag.add_warning_at_line("parse", "skipping malformed generator line", lineno)
                }
            },
            Section::Transformer => match parse_transformer_line(line) {
                Some(t) => case.transformers.push(t),
                None => {
                    diag.add_warning_at_line("parse", "skipping malformed transformer line", lineno)
                }
            },
            Section::Substation => {
                parse_substation_line(line, &mut case.substations, &mut diag, lineno)
            }
            Section::None => {
                diag.add_warning_at_line("parse", "line outside any section", lineno)
            }
        }
    }

    if !header_seen {
        return Err(GmxError::Parse("case has no header line".into()));
    }
    debug!(
        buses = case.buses.len(),
        substations = case.substations.len(),
        "parsed case"
    );
    Ok((case, diag))
}

/// Header line: `<sbase>, <ignore-nominal-flag> / <title>`.
fn parse_header(raw_line: &str) -> Option<CaseIdent> {
    let (fields, title) = match raw_line.split_once('/') {
        Some((fields, title)) => (fields, title.trim().to_string()),
        None => (raw_line, String::new()),
    };
    let columns: Vec<&str> = fields.split(',').map(|s| s.trim()).collect();
    let sbase = columns.first()?.parse::<f64>().ok()?;
    let ignore_nominal_voltages = columns
        .get(1)
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(0)
        != 0;
    Some(CaseIdent {
        sbase: MegavoltAmperes(sbase),
        ignore_nominal_voltages,
        title,
    })
}

fn unquote(s: &str) -> String {
    s.trim_matches('\'').trim_matches('"').trim().to_string()
}

/// `num, 'NAME', basekv, type, vm, va`
fn parse_bus_line(line: &str) -> Option<BusRecord> {
    let columns: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if columns.len() < 4 {
        return None;
    }
    Some(BusRecord {
        num: BusNum::new(columns[0].parse().ok()?),
        name: unquote(columns[1]),
        base_kv: Kilovolts(columns[2].parse().unwrap_or(0.0)),
        bus_type: BusTypeCode::from_code(columns[3].parse().ok()?)?,
        vm: PerUnit(columns.get(4).and_then(|s| s.parse().ok()).unwrap_or(1.0)),
        va: Degrees(columns.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.0)),
    })
}

/// `bus, 'ID', status, p, q`
fn parse_load_line(line: &str) -> Option<LoadRecord> {
    let columns: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if columns.len() < 5 {
        return None;
    }
    Some(LoadRecord {
        bus: BusNum::new(columns[0].parse().ok()?),
        id: unquote(columns[1]),
        in_service: columns[2].parse::<i32>().ok()? != 0,
        p: Megawatts(columns[3].parse().unwrap_or(0.0)),
        q: Megavars(columns[4].parse().unwrap_or(0.0)),
    })
}

/// `bus, 'ID', status, p, q, vset, regbus, regnode`
fn parse_generator_line(line: &str) -> Option<GeneratorRecord> {
    let columns: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if columns.len() < 5 {
        return None;
    }
    let regulated_bus = columns
        .get(6)
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|n| *n != 0)
        .map(BusNum::new);
    let regulated_node = columns
        .get(7)
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|n| *n != 0)
        .map(NodeId::new);
    Some(GeneratorRecord {
        bus: BusNum::new(columns[0].parse().ok()?),
        id: unquote(columns[1]),
        in_service: columns[2].parse::<i32>().ok()? != 0,
        p: Megawatts(columns[3].parse().unwrap_or(0.0)),
        q: Megavars(columns[4].parse().unwrap_or(0.0)),
        voltage_setpoint: PerUnit(columns.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.0)),
        regulated_bus,
        regulated_node,
    })
}

/// One transformer per line: 20 header columns, then 7 columns per
/// winding. `bus3` of 0 marks a two-winding record.
fn parse_transformer_line(line: &str) -> Option<TransformerRecord> {
    let columns: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if columns.len() < 41 {
        return None;
    }
    let f = |i: usize| -> f64 { columns[i].parse().unwrap_or(0.0) };
    let bus3 = columns[2].parse::<i32>().ok()?;
    let mut windings: Vec<WindingRecord> = Vec::with_capacity(3);
    for w in 0..3 {
        let base = 20 + 7 * w;
        windings.push(WindingRecord {
            windv: f(base),
            nomv: Kilovolts(f(base + 1)),
            ang: Degrees(f(base + 2)),
            rma: f(base + 3),
            rmi: f(base + 4),
            ntp: columns[base + 5].parse().unwrap_or(1),
            cod: columns[base + 6].parse().unwrap_or(0),
        });
    }
    let windings: [WindingRecord; 3] = windings.try_into().ok()?;
    Some(TransformerRecord {
        bus1: BusNum::new(columns[0].parse().ok()?),
        bus2: BusNum::new(columns[1].parse().ok()?),
        bus3: (bus3 != 0).then(|| BusNum::new(bus3)),
        circuit: unquote(columns[3]),
        name: unquote(columns[4]),
        in_service: columns[5].parse::<i32>().ok()? != 0,
        cw: columns[6].parse().ok()?,
        cz: columns[7].parse().ok()?,
        cm: columns[8].parse().ok()?,
        mag1: f(9),
        mag2: f(10),
        r12: f(11),
        x12: f(12),
        sbase12: MegavoltAmperes(f(13)),
        r23: f(14),
        x23: f(15),
        sbase23: MegavoltAmperes(f(16)),
        r31: f(17),
        x31: f(18),
        sbase31: MegavoltAmperes(f(19)),
        windings,
    })
}

/// Substation sub-lines. `S,` opens a new block; `N,`/`W,`/`T,` extend
/// the most recent one.
fn parse_substation_line(
    line: &str,
    substations: &mut Vec<SubstationRecord>,
    diag: &mut Diagnostics,
    lineno: usize,
) {
    let columns: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    let Some(prefix) = columns.first() else {
        return;
    };
    match prefix.to_ascii_uppercase().as_str() {
        "S" => {
            let Some(id) = columns.get(1).and_then(|s| s.parse::<i32>().ok()) else {
                diag.add_warning_at_line("parse", "skipping malformed substation line", lineno);
                return;
            };
            substations.push(SubstationRecord {
                id: SubstationId::new(id),
                name: columns.get(2).map(|s| unquote(s)).unwrap_or_default(),
                nodes: Vec::new(),
                switching_devices: Vec::new(),
                terminals: Vec::new(),
            });
        }
        "N" => {
            let Some(sub) = substations.last_mut() else {
                diag.add_warning_at_line("parse", "node line before any substation", lineno);
                return;
            };
            let parsed = (|| {
                Some(NodeRecord {
                    id: NodeId::new(columns.get(1)?.parse().ok()?),
                    name: columns.get(2).map(|s| unquote(s)).unwrap_or_default(),
                    bus: BusNum::new(columns.get(3)?.parse().ok()?),
                    vm: columns
                        .get(4)
                        .filter(|s| !s.is_empty())
                        .and_then(|s| s.parse().ok())
                        .map(PerUnit),
                    va: columns
                        .get(5)
                        .filter(|s| !s.is_empty())
                        .and_then(|s| s.parse().ok())
                        .map(Degrees),
                })
            })();
            match parsed {
                Some(node) => sub.nodes.push(node),
                None => diag.add_warning_at_line("parse", "skipping malformed node line", lineno),
            }
        }
        "W" => {
            let Some(sub) = substations.last_mut() else {
                diag.add_warning_at_line("parse", "switch line before any substation", lineno);
                return;
            };
            let parsed = (|| {
                let kind = match columns.get(4)?.parse::<i32>().ok()? {
                    1 => SwitchingDeviceKind::Breaker,
                    2 => SwitchingDeviceKind::Disconnector,
                    _ => return None,
                };
                Some(SwitchingDeviceRecord {
                    node1: NodeId::new(columns.get(1)?.parse().ok()?),
                    node2: NodeId::new(columns.get(2)?.parse().ok()?),
                    circuit: unquote(columns.get(3)?),
                    kind,
                    open: columns.get(5)?.parse::<i32>().ok()? == 0,
                })
            })();
            match parsed {
                Some(sw) => sub.switching_devices.push(sw),
                None => {
                    diag.add_warning_at_line("parse", "skipping malformed switch line", lineno)
                }
            }
        }
        "T" => {
            let Some(sub) = substations.last_mut() else {
                diag.add_warning_at_line("parse", "terminal line before any substation", lineno);
                return;
            };
            let parsed = (|| {
                let other = |i: usize| -> Option<BusNum> {
                    columns
                        .get(i)
                        .and_then(|s| s.parse::<i32>().ok())
                        .filter(|n| *n != 0)
                        .map(BusNum::new)
                };
                Some(TerminalRecord {
                    bus: BusNum::new(columns.get(1)?.parse().ok()?),
                    node: NodeId::new(columns.get(2)?.parse().ok()?),
                    kind: equipment_kind_from_code(&unquote(columns.get(3)?))?,
                    equipment_id: unquote(columns.get(4)?),
                    other_bus_1: other(5),
                    other_bus_2: other(6),
                })
            })();
            match parsed {
                Some(t) => sub.terminals.push(t),
                None => {
                    diag.add_warning_at_line("parse", "skipping malformed terminal line", lineno)
                }
            }
        }
        _ => diag.add_warning_at_line("parse", "unknown substation sub-line prefix", lineno),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmx_core::EquipmentKind;

    const SAMPLE: &str = "\
100.0, 0 / three-node demo
BUS DATA FOLLOWS
100, 'STATION A', 230.0, 3, 1.02, -1.5
200, 'STATION B', 110.0, 1, 1.0, 0.0
END OF BUS DATA
LOAD DATA FOLLOWS
200, '1', 1, 50.0, 10.0
END OF LOAD DATA
GENERATOR DATA FOLLOWS
100, '1', 1, 80.0, 20.0, 1.02, 0, 0
END OF GENERATOR DATA
TRANSFORMER DATA FOLLOWS
100, 200, 0, '1', 'T1', 1, 1, 1, 1, 0.0, 0.0, 0.01, 0.05, 100.0, 0, 0, 100.0, 0, 0, 100.0, 1.0, 0, 0, 1.1, 0.9, 1, 0, 1.0, 0, 0, 1.1, 0.9, 1, 0, 1.0, 0, 0, 1.1, 0.9, 1, 0
END OF TRANSFORMER DATA
SUBSTATION DATA FOLLOWS
S, 1, 'S1'
N, 1, '', 100, 1.02, -1.5
N, 2, '', 100,,
W, 1, 2, '1', 1, 1
T, 100, 1, 'M', '1', 0, 0
T, 100, 2, '2', '1', 200, 0
END OF SUBSTATION DATA
";

    #[test]
    fn test_parse_sample_case() {
        let (case, diag) = parse_case(SAMPLE).unwrap();
        assert!(!diag.has_issues(), "{}", diag.summary());

        assert_eq!(case.ident.sbase, MegavoltAmperes(100.0));
        assert_eq!(case.ident.title, "three-node demo");
        assert_eq!(case.buses.len(), 2);
        assert_eq!(case.buses[0].bus_type, BusTypeCode::Slack);
        assert_eq!(case.buses[0].name, "STATION A");
        assert_eq!(case.loads.len(), 1);
        assert_eq!(case.generators.len(), 1);
        assert_eq!(case.generators[0].voltage_setpoint, PerUnit(1.02));
        assert_eq!(case.transformers.len(), 1);
        assert!(!case.transformers[0].is_three_winding());
        assert_eq!(case.transformers[0].x12, 0.05);

        let sub = &case.substations[0];
        assert_eq!(sub.nodes.len(), 2);
        assert_eq!(sub.nodes[0].vm, Some(PerUnit(1.02)));
        assert_eq!(sub.nodes[1].vm, None);
        assert_eq!(sub.switching_devices.len(), 1);
        assert!(!sub.switching_devices[0].open);
        assert_eq!(sub.terminals.len(), 2);
        assert_eq!(sub.terminals[1].kind, EquipmentKind::TwoWindingTransformer);
        assert_eq!(sub.terminals[1].other_bus_1, Some(BusNum::new(200)));
    }

    #[test]
    fn test_comments_and_blank_lines_are_ignored()  {
        let text = "100.0, 0 / t\nBUS DATA FOLLOWS\n\n100, 'A', 230.0, 1 / trailing comment\nEND OF BUS DATA\n";
        let (case, diag) = parse_case(text).unwrap();
        assert_eq!(case.buses.len(), 1);
        assert!(!diag.has_issues());
    }

    #[test]
    fn test_malformed_line_warns_and_continues() {
        let text = "100.0, 0 / t\nBUS DATA FOLLOWS\nnot-a-bus\n100, 'A', 230.0, 1\nEND OF BUS DATA\n";
        let (case, diag) = parse_case(text).unwrap();
        assert_eq!(case.buses.len(), 1);
        assert_eq!(diag.warning_count(), 1);
    }

    #[test]
    fn test_missing_header_is_fatal() {
        assert!(parse_case("").is_err());
        assert!(parse_case("garbage header\n").is_err());
    }

    #[test]
    fn test_unreadable_file_error_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.gmx");
        let err = read_case_file(&path).unwrap_err();
        assert!(err.to_string().contains("does-not-exist.gmx"), "{}", err);
    }
}
