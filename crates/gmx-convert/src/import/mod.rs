//! Import direction: flat tabular case to hierarchical network model.
//!
//! Validation runs once over every substation before any topology or
//! equipment is created; topology materialization runs next, per voltage
//! level; equipment and transformer conversion run last against the slot
//! maps the topology pass produced. The ordering is a hard requirement,
//! not a performance choice.

pub mod topology;
pub mod transformer;
pub mod validator;

use std::collections::BTreeMap;

use gmx_core::{
    Attachment, BusNum, ConversionDiagnostics, EquipmentKind, Generator, GmxResult, Load, Network,
    SubstationId,
};
use tracing::{debug, info};

use crate::context::PerUnitContext;
use crate::records::{BusRecord, BusTypeCode, RawCase};
use topology::{import_voltage_level, ImportedVoltageLevel, VoltageLevelPlan};
use transformer::{import_three_winding, import_two_winding, TransformerEnd};
use validator::SubstationIndex;

/// Convert a raw case into the hierarchical model.
///
/// Returns the model together with the diagnostics of everything that was
/// degraded along the way. Unsupported conversion codes and numeric
/// degeneracies fail the whole conversion; structural problems downgrade
/// to bus-breaker topology and keep going.
pub fn import_case(case: &RawCase) -> GmxResult<(Network, ConversionDiagnostics)> {
    let ctx = PerUnitContext::from_ident(&case.ident);
    let mut conv = ConversionDiagnostics::new();

    let controls = validator::control_refs(case);
    let index = validator::validate_substations(case, &controls, &mut conv);

    let plans = plan_voltage_levels(case, &index);
    let mut imported: Vec<ImportedVoltageLevel> = Vec::with_capacity(plans.len());
    let mut vl_of_bus: BTreeMap<BusNum, usize> = BTreeMap::new();
    for plan in &plans {
        for bus in &plan.buses {
            vl_of_bus.insert(bus.num, imported.len());
        }
        imported.push(import_voltage_level(plan, &mut conv));
    }

    let find = |bus: BusNum, kind: EquipmentKind, id: &str| -> Option<Attachment> {
        vl_of_bus
            .get(&bus)
            .and_then(|i| imported[*i].attachment(bus, kind, id))
            .cloned()
    };

    let mut network = Network::new();

    let mut loads: Vec<_> = case.loads.iter().collect();
    loads.sort_by(|a, b| (a.bus, a.id.as_str()).cmp(&(b.bus, b.id.as_str())));
    for rec in loads {
        if !rec.in_service {
            debug!(bus = %rec.bus, id = %rec.id, "skipping out-of-service load");
            continue;
        }
        let Some(attachment) = find(rec.bus, EquipmentKind::Load, &rec.id) else {
            conv.diagnostics.add_error_with_entity(
                "import",
                "load references a bus that is not in the case",
                &format!("Load {} at bus {}", rec.id, rec.bus),
            );
            continue;
        };
        network.loads.push(Load {
            id: format!("L-{}-{}", rec.bus, rec.id),
            attachment,
            p: rec.p,
            q: rec.q,
        });
    }

    let mut generators: Vec<_> = case.generators.iter().collect();
    generators.sort_by(|a, b| (a.bus, a.id.as_str()).cmp(&(b.bus, b.id.as_str())));
    for rec in generators {
        if !rec.in_service {
            debug!(bus = %rec.bus, id = %rec.id, "skipping out-of-service generator");
            continue;
        }
        let Some(attachment) = find(rec.bus, EquipmentKind::Generator, &rec.id) else {
            conv.diagnostics.add_error_with_entity(
                "import",
                "generator references a bus that is not in the case",
                &format!("Generator {} at bus {}", rec.id, rec.bus),
            );
            continue;
        };
        let regulating = rec.voltage_setpoint.value() > 0.0;
        let slack = case
            .bus(rec.bus)
            .map(|b| b.bus_type == BusTypeCode::Slack)
            .unwrap_or(false);
        network.generators.push(Generator {
            id: format!("G-{}-{}", rec.bus, rec.id),
            attachment,
            p: rec.p,
            q: rec.q,
            voltage_setpoint: regulating.then_some(rec.voltage_setpoint),
            regulating,
            slack,
        });
    }

    let mut transformers: Vec<_> = case.transformers.iter().collect();
    transformers.sort_by(|a, b| {
        (a.bus1, a.bus2, a.bus3, a.circuit.as_str()).cmp(&(b.bus1, b.bus2, b.bus3, b.circuit.as_str()))
    });
    for rec in transformers {
        if !rec.in_service {
            debug!(transformer = %rec.label(), "skipping out-of-service transformer");
            continue;
        }
        let kind = if rec.is_three_winding() {
            EquipmentKind::ThreeWindingTransformer
        } else {
            EquipmentKind::TwoWindingTransformer
        };
        let end_buses: Vec<BusNum> = match rec.bus3 {
            Some(k) => vec![rec.bus1, rec.bus2, k],
            None => vec![rec.bus1, rec.bus2],
        };
        let mut ends: Vec<TransformerEnd> = Vec::with_capacity(end_buses.len());
        let mut missing = false;
        for bus in &end_buses {
            let base = case.bus(*bus).map(|b| b.base_kv);
            let attachment = find(*bus, kind, &rec.circuit);
            match (base, attachment) {
                (Some(bus_base), Some(attachment)) => ends.push(TransformerEnd {
                    attachment,
                    bus_base,
                }),
                _ => {
                    conv.diagnostics.add_error_with_entity(
                        "import",
                        &format!("transformer end references unknown bus {}", bus),
                        &rec.label(),
                    );
                    missing = true;
                }
            }
        }
        if missing {
            continue;
        }
        if rec.is_three_winding() {
            let ends: [TransformerEnd; 3] = match ends.try_into() {
                Ok(e) => e,
                Err(_) => continue,
            };
            let t = import_three_winding(rec, &ends, &ctx, &mut conv)?;
            network.transformers_3w.push(t);
        } else {
            let ends: [TransformerEnd; 2] = match ends.try_into() {
                Ok(e) => e,
                Err(_) => continue,
            };
            let t = import_two_winding(rec, &ends, &ctx, &mut conv)?;
            network.transformers_2w.push(t);
        }
    }

    network.voltage_levels = imported.into_iter().map(|vl| vl.voltage_level).collect();
    network.validate_into(&mut conv.diagnostics);

    info!(
        voltage_levels = network.voltage_levels.len(),
        "imported case: {}",
        conv.summary()
    );
    Ok((network, conv))
}

/// Partition the case's buses into voltage levels.
///
/// Buses governed by the same valid substation group per base voltage
/// into one node-breaker voltage level; every other bus becomes its own
/// bus-breaker voltage level. Group keys order by substation id then
/// voltage so the output order is stable.
fn plan_voltage_levels<'a>(
    case: &'a RawCase,
    index: &SubstationIndex<'a>,
) -> Vec<VoltageLevelPlan<'a>> {
    let mut governed: BTreeMap<(SubstationId, u64), Vec<&'a BusRecord>> = BTreeMap::new();
    let mut singles: Vec<&'a BusRecord> = Vec::new();
    let mut buses: Vec<&'a BusRecord> = case.buses.iter().collect();
    buses.sort_by_key(|b| b.num);
    for bus in buses {
        match index.governing(bus.num) {
            Some(sub) => governed
                .entry((sub.id, bus.base_kv.value().to_bits()))
                .or_default()
                .push(bus),
            None => singles.push(bus),
        }
    }

    let mut plans = Vec::new();
    for ((sub_id, _), group) in governed {
        let nominal_kv = group[0].base_kv;
        plans.push(VoltageLevelPlan {
            vl_id: format!("VL-S{}-{}", sub_id, nominal_kv.value()),
            nominal_kv,
            expected_equipment: expected_equipment(case, &group),
            substation: index.governing(group[0].num),
            buses: group,
        });
    }
    for bus in singles {
        let group = vec![bus];
        plans.push(VoltageLevelPlan {
            vl_id: format!("VL-{}", bus.num),
            nominal_kv: bus.base_kv,
            expected_equipment: expected_equipment(case, &group),
            substation: None,
            buses: group,
        });
    }
    plans
}

/// Equipment expected to terminate on the given buses, in (kind, id, bus)
/// order.
fn expected_equipment(
    case: &RawCase,
    buses: &[&BusRecord],
) -> Vec<(EquipmentKind, String, BusNum)> {
    let in_group = |bus: BusNum| buses.iter().any(|b| b.num == bus);
    let mut expected = Vec::new();
    for rec in &case.loads {
        if rec.in_service && in_group(rec.bus) {
            expected.push((EquipmentKind::Load, rec.id.clone(), rec.bus));
        }
    }
    for rec in &case.generators {
        if rec.in_service && in_group(rec.bus) {
            expected.push((EquipmentKind::Generator, rec.id.clone(), rec.bus));
        }
    }
    for rec in &case.transformers {
        if !rec.in_service {
            continue;
        }
        let kind = if rec.is_three_winding() {
            EquipmentKind::ThreeWindingTransformer
        } else {
            EquipmentKind::TwoWindingTransformer
        };
        let mut ends = vec![rec.bus1, rec.bus2];
        if let Some(k) = rec.bus3 {
            ends.push(k);
        }
        for bus in ends {
            if in_group(bus) {
                expected.push((kind, rec.circuit.clone(), bus));
            }
        }
    }
    expected.sort();
    expected
}
