//! Export direction: hierarchical network model to flat tabular case.
//!
//! Topology flattens first, voltage level by voltage level in id order;
//! equipment serialization runs afterwards against the attachment index
//! the topology pass produced. Node-breaker detail survives as substation
//! blocks; anything over the format's node budget degrades to coarse
//! buses with a diagnostic.

pub mod topology;
pub mod transformer;

use std::collections::BTreeMap;

use gmx_core::{
    Attachment, BusNum, ConversionDiagnostics, Degrees, EquipmentKind, GmxResult, LineEnd,
    Network, PerUnit, SubstationId,
};
use tracing::info;

use crate::records::{
    BusRecord, BusTypeCode, CaseIdent, GeneratorRecord, LoadRecord, RawCase, SubstationRecord,
    TerminalRecord,
};
use topology::{
    export_voltage_level, BusAllocator, CircuitIdAllocator, ExportIndex, ExportSlot,
    SubstationAllocator,
};
use transformer::{export_three_winding, export_two_winding};

/// Last id segment of a host identifier, used as the natural circuit or
/// pair id when exporting.
fn natural_id(host_id: &str) -> Option<&str> {
    host_id.rsplit('-').next()
}

/// Convert the hierarchical model into a raw case.
pub fn export_network(network: &Network) -> GmxResult<(RawCase, ConversionDiagnostics)> {
    let mut conv = ConversionDiagnostics::new();
    let mut bus_alloc = BusAllocator::new();
    let mut sub_alloc = SubstationAllocator::new();
    let mut circuits = CircuitIdAllocator::new();
    let mut index = ExportIndex::new();

    let mut case = RawCase {
        ident: CaseIdent::default(),
        ..RawCase::default()
    };
    let mut substations: Vec<SubstationRecord> = Vec::new();
    let mut sub_slot: BTreeMap<SubstationId, usize> = BTreeMap::new();

    for vl in network.voltage_levels_ordered() {
        let exported = export_voltage_level(
            vl,
            network,
            &mut bus_alloc,
            &mut sub_alloc,
            &mut circuits,
            &mut index,
            &mut conv,
        );
        case.buses.extend(exported.buses);
        if let Some(sub) = exported.substation {
            sub_slot.insert(sub.id, substations.len());
            substations.push(sub);
        }
    }

    let mut resolve = |att: &Attachment,
                       entity: &str,
                       conv: &mut ConversionDiagnostics|
     -> Option<ExportSlot> {
        let slot = index.resolve(att);
        if slot.is_none() {
            conv.diagnostics.add_error_with_entity(
                "export",
                "attachment does not resolve to an exported bus",
                entity,
            );
        }
        slot
    };
    let mut terminal = |substations: &mut Vec<SubstationRecord>,
                        slot: &ExportSlot,
                        kind: EquipmentKind,
                        equipment_id: &str,
                        others: (Option<BusNum>, Option<BusNum>)| {
        if let Some((sub_id, node)) = slot.node {
            if let Some(i) = sub_slot.get(&sub_id) {
                substations[*i].terminals.push(TerminalRecord {
                    bus: slot.bus,
                    node,
                    kind,
                    equipment_id: equipment_id.to_string(),
                    other_bus_1: others.0,
                    other_bus_2: others.1,
                });
            }
        }
    };

    let mut loads: Vec<_> = network.loads.iter().collect();
    loads.sort_by(|a, b| a.id.cmp(&b.id));
    for load in loads {
        let Some(slot) = resolve(&load.attachment, &format!("Load {}", load.id), &mut conv)
        else {
            continue;
        };
        let id = circuits.assign(slot.bus, slot.bus, 'l', natural_id(&load.id));
        terminal(&mut substations, &slot, EquipmentKind::Load, &id, (None, None));
        case.loads.push(LoadRecord {
            bus: slot.bus,
            id,
            in_service: true,
            p: load.p,
            q: load.q,
        });
    }

    let mut generators: Vec<_> = network.generators.iter().collect();
    generators.sort_by(|a, b| a.id.cmp(&b.id));
    for gen in generators {
        let Some(slot) = resolve(&gen.attachment, &format!("Generator {}", gen.id), &mut conv)
        else {
            continue;
        };
        let id = circuits.assign(slot.bus, slot.bus, 'g', natural_id(&gen.id));
        terminal(
            &mut substations,
            &slot,
            EquipmentKind::Generator,
            &id,
            (None, None),
        );
        case.generators.push(GeneratorRecord {
            bus: slot.bus,
            id,
            in_service: true,
            p: gen.p,
            q: gen.q,
            voltage_setpoint: gen.voltage_setpoint.unwrap_or(PerUnit(0.0)),
            regulated_bus: gen
                .regulating
                .then(|| slot.node.map(|_| slot.bus))
                .flatten(),
            regulated_node: gen
                .regulating
                .then(|| slot.node.map(|(_, n)| n))
                .flatten(),
        });
    }

    let mut shunts: Vec<_> = network.shunts.iter().collect();
    shunts.sort_by(|a, b| a.id.cmp(&b.id));
    for shunt in shunts {
        let Some(slot) = resolve(&shunt.attachment, &format!("Shunt {}", shunt.id), &mut conv)
        else {
            continue;
        };
        let id = circuits.assign(slot.bus, slot.bus, 'f', natural_id(&shunt.id));
        terminal(
            &mut substations,
            &slot,
            EquipmentKind::FixedShunt,
            &id,
            (None, None),
        );
    }

    // Lines have no record section of their own here, but their terminals
    // participate in the substation blocks, and a dangling end needs a
    // synthetic boundary bus.
    let mut lines: Vec<_> = network.lines.iter().collect();
    lines.sort_by(|a, b| a.id.cmp(&b.id));
    for line in lines {
        let Some(slot1) = resolve(&line.end1, &format!("Line {}", line.id), &mut conv) else {
            continue;
        };
        match &line.end2 {
            LineEnd::Attached(end2) => {
                let Some(slot2) = resolve(end2, &format!("Line {}", line.id), &mut conv) else {
                    continue;
                };
                let id = circuits.assign(slot1.bus, slot2.bus, 'b', natural_id(&line.id));
                terminal(
                    &mut substations,
                    &slot1,
                    EquipmentKind::Line,
                    &id,
                    (Some(slot2.bus), None),
                );
                terminal(
                    &mut substations,
                    &slot2,
                    EquipmentKind::Line,
                    &id,
                    (Some(slot1.bus), None),
                );
            }
            LineEnd::Boundary { base_kv } => {
                // boundary declared base wins over the host nominal
                let host_kv = network
                    .voltage_level(line.end1.voltage_level())
                    .map(|vl| vl.nominal_kv);
                let boundary_kv = base_kv.or(host_kv).unwrap_or(gmx_core::Kilovolts(0.0));
                let boundary = bus_alloc.allocate();
                case.buses.push(BusRecord {
                    num: boundary,
                    name: format!("X-{}", line.id),
                    base_kv: boundary_kv,
                    bus_type: BusTypeCode::Disconnected,
                    vm: PerUnit::ONE,
                    va: Degrees(0.0),
                });
                let id = circuits.assign(slot1.bus, boundary, 'b', natural_id(&line.id));
                // the boundary bus fills the second other-bus slot
                terminal(
                    &mut substations,
                    &slot1,
                    EquipmentKind::Line,
                    &id,
                    (None, Some(boundary)),
                );
            }
        }
    }

    let nominal_kv =
        |att: &Attachment| network.voltage_level(att.voltage_level()).map(|vl| vl.nominal_kv);

    let mut two_windings: Vec<_> = network.transformers_2w.iter().collect();
    two_windings.sort_by(|a, b| a.id.cmp(&b.id));
    for t in two_windings {
        let (Some(slot1), Some(slot2)) = (
            resolve(&t.end1, &format!("Transformer {}", t.id), &mut conv),
            resolve(&t.end2, &format!("Transformer {}", t.id), &mut conv),
        ) else {
            continue;
        };
        let circuit = circuits.assign(slot1.bus, slot2.bus, '2', natural_id(&t.id));
        terminal(
            &mut substations,
            &slot1,
            EquipmentKind::TwoWindingTransformer,
            &circuit,
            (Some(slot2.bus), None),
        );
        terminal(
            &mut substations,
            &slot2,
            EquipmentKind::TwoWindingTransformer,
            &circuit,
            (Some(slot1.bus), None),
        );
        let bases = [
            nominal_kv(&t.end1).unwrap_or(t.rated_u1),
            nominal_kv(&t.end2).unwrap_or(t.rated_u2),
        ];
        case.transformers.push(export_two_winding(
            t,
            slot1.bus,
            slot2.bus,
            circuit,
            case.ident.sbase,
            bases,
        )?);
        conv.stats.transformers += 1;
    }

    let mut three_windings: Vec<_> = network.transformers_3w.iter().collect();
    three_windings.sort_by(|a, b| a.id.cmp(&b.id));
    for t in three_windings {
        let slots: Vec<ExportSlot> = t
            .legs
            .iter()
            .filter_map(|leg| resolve(&leg.end, &format!("Transformer {}", t.id), &mut conv))
            .collect();
        let Ok(slots) = <[ExportSlot; 3]>::try_from(slots) else {
            continue;
        };
        let circuit = circuits.assign(slots[0].bus, slots[1].bus, '3', natural_id(&t.id));
        // other terminals visit in leg order
        for i in 0..3 {
            let others: Vec<BusNum> = (0..3).filter(|j| *j != i).map(|j| slots[j].bus).collect();
            terminal(
                &mut substations,
                &slots[i],
                EquipmentKind::ThreeWindingTransformer,
                &circuit,
                (Some(others[0]), Some(others[1])),
            );
        }
        let bases = [
            nominal_kv(&t.legs[0].end).unwrap_or(t.legs[0].rated_u),
            nominal_kv(&t.legs[1].end).unwrap_or(t.legs[1].rated_u),
            nominal_kv(&t.legs[2].end).unwrap_or(t.legs[2].rated_u),
        ];
        case.transformers.push(export_three_winding(
            t,
            [slots[0].bus, slots[1].bus, slots[2].bus],
            circuit,
            case.ident.sbase,
            bases,
        )?);
        conv.stats.transformers += 1;
    }

    for sub in &mut substations {
        sub.terminals.sort_by(|a, b| {
            (a.bus, a.node, a.kind, a.equipment_id.as_str())
                .cmp(&(b.bus, b.node, b.kind, b.equipment_id.as_str()))
        });
    }
    case.substations = substations;
    conv.stats.substations_valid = case.substations.len();

    info!(
        buses = case.buses.len(),
        substations = case.substations.len(),
        "exported case: {}",
        conv.summary()
    );
    Ok((case, conv))
}
