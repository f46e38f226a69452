//! Structural validation of substation blocks.
//!
//! Runs once over every substation of a case before any equipment is
//! created, and classifies each one as node-breaker-capable or not. The
//! verdict is silent: an invalid substation is never an error, it simply
//! forces the importer to fall back to bus-breaker topology for the buses
//! it claimed.
//!
//! A coarse-bus-set is eligible for node-breaker topology iff exactly one
//! valid substation governs it; ambiguity or absence always degrades,
//! never produces a partial result.

use std::collections::{BTreeMap, BTreeSet};

use gmx_core::{BusNum, ConversionDiagnostics, NodeId, SubstationId, TopologyGraph};
use tracing::debug;

use crate::records::{RawCase, SubstationRecord, TerminalRecord};

/// A regulation/control reference to a (bus, node) pair, e.g. a remote
/// regulated point of a generator.
#[derive(Debug, Clone)]
pub struct ControlRef {
    pub bus: BusNum,
    pub node: NodeId,
    /// Owner description for diagnostics
    pub owner: String,
}

/// Collect the control references of a case (remote regulation points that
/// name both a bus and a node).
pub fn control_refs(case: &RawCase) -> Vec<ControlRef> {
    let mut refs = Vec::new();
    for gen in &case.generators {
        if let (Some(bus), Some(node)) = (gen.regulated_bus, gen.regulated_node) {
            refs.push(ControlRef {
                bus,
                node,
                owner: format!("Generator {}@{}", gen.id, gen.bus),
            });
        }
    }
    refs
}

/// Indices produced by validation, consumed by the topology importer.
#[derive(Debug)]
pub struct SubstationIndex<'a> {
    valid: BTreeMap<SubstationId, &'a SubstationRecord>,
    /// Owning valid substation per coarse bus
    bus_owner: BTreeMap<BusNum, SubstationId>,
    /// Node-set owned by each coarse bus (valid substations only)
    bus_nodes: BTreeMap<BusNum, BTreeSet<NodeId>>,
    /// Equipment terminals per coarse bus (valid substations only)
    bus_terminals: BTreeMap<BusNum, Vec<&'a TerminalRecord>>,
}

impl<'a> SubstationIndex<'a> {
    pub fn is_valid(&self, id: SubstationId) -> bool {
        self.valid.contains_key(&id)
    }

    pub fn valid_count(&self) -> usize {
        self.valid.len()
    }

    /// The single valid substation governing `bus`, if any.
    pub fn governing(&self, bus: BusNum) -> Option<&'a SubstationRecord> {
        self.bus_owner.get(&bus).and_then(|id| self.valid.get(id)).copied()
    }

    /// The single valid substation governing the whole bus set, if any.
    ///
    /// Every bus of the set must be claimed by the same valid substation;
    /// a partially-claimed or multiply-claimed set is not eligible.
    pub fn governing_for_set(&self, buses: &[BusNum]) -> Option<&'a SubstationRecord> {
        let mut owner: Option<SubstationId> = None;
        for bus in buses {
            match self.bus_owner.get(bus) {
                None => return None,
                Some(id) => match owner {
                    None => owner = Some(*id),
                    Some(prev) if prev != *id => return None,
                    Some(_) => {}
                },
            }
        }
        owner.and_then(|id| self.valid.get(&id)).copied()
    }

    /// Node-set owned by `bus` within its valid substation.
    pub fn nodes_of(&self, bus: BusNum) -> Option<&BTreeSet<NodeId>> {
        self.bus_nodes.get(&bus)
    }

    /// Whether `node` belongs to `bus` within a valid substation.
    pub fn node_owned_by(&self, bus: BusNum, node: NodeId) -> bool {
        self.bus_nodes
            .get(&bus)
            .map(|nodes| nodes.contains(&node))
            .unwrap_or(false)
    }

    /// Equipment terminals recorded at `bus` within its valid substation.
    pub fn terminals_at(&self, bus: BusNum) -> &[&'a TerminalRecord] {
        self.bus_terminals
            .get(&bus)
            .map(|t| t.as_slice())
            .unwrap_or(&[])
    }
}

/// Run structural validation over every substation of the case.
pub fn validate_substations<'a>(
    case: &'a RawCase,
    controls: &[ControlRef],
    conv: &mut ConversionDiagnostics,
) -> SubstationIndex<'a> {
    // Phase 1: internal consistency. Every switch-connected component of a
    // substation's nodes must map to exactly one coarse bus, and node ids
    // must be unique within the substation.
    let mut invalid: BTreeSet<SubstationId> = BTreeSet::new();
    for sub in &case.substations {
        if let Some(reason) = internal_invalidity(sub) {
            conv.diagnostics.add_warning_with_entity(
                "validation",
                &reason,
                &format!("Substation {}", sub.id),
            );
            invalid.insert(sub.id);
        }
    }

    // Phase 2: a coarse bus claimed by more than one internally-valid
    // substation invalidates every claimant.
    let mut claims: BTreeMap<BusNum, Vec<SubstationId>> = BTreeMap::new();
    for sub in &case.substations {
        if invalid.contains(&sub.id) {
            continue;
        }
        let buses: BTreeSet<BusNum> = sub.nodes.iter().map(|n| n.bus).collect();
        for bus in buses {
            claims.entry(bus).or_default().push(sub.id);
        }
    }
    for (bus, claimants) in &claims {
        if claimants.len() > 1 {
            for id in claimants {
                if invalid.insert(*id) {
                    conv.diagnostics.add_warning_with_entity(
                        "validation",
                        &format!("bus {} is claimed by more than one substation", bus),
                        &format!("Substation {}", id),
                    );
                }
            }
        }
    }

    // Phase 3: every terminal and control reference must name a node that
    // the referenced bus actually owns.
    let mut bus_nodes: BTreeMap<BusNum, (SubstationId, BTreeSet<NodeId>)> = BTreeMap::new();
    for sub in &case.substations {
        if invalid.contains(&sub.id) {
            continue;
        }
        for node in &sub.nodes {
            bus_nodes
                .entry(node.bus)
                .or_insert_with(|| (sub.id, BTreeSet::new()))
                .1
                .insert(node.id);
        }
    }

    for sub in &case.substations {
        if invalid.contains(&sub.id) {
            continue;
        }
        for terminal in &sub.terminals {
            let owned = bus_nodes
                .get(&terminal.bus)
                .map(|(_, nodes)| nodes.contains(&terminal.node))
                .unwrap_or(false);
            if !owned {
                conv.diagnostics.add_warning_with_entity(
                    "validation",
                    &format!(
                        "terminal of {} {} references node {} not owned by bus {}",
                        terminal.kind, terminal.equipment_id, terminal.node, terminal.bus
                    ),
                    &format!("Substation {}", sub.id),
                );
                invalid.insert(sub.id);
                break;
            }
        }
    }

    for control in controls {
        if let Some((sub_id, nodes)) = bus_nodes.get(&control.bus) {
            if !nodes.contains(&control.node) && !invalid.contains(sub_id) {
                conv.diagnostics.add_warning_with_entity(
                    "validation",
                    &format!(
                        "control reference of {} names node {} not owned by bus {}",
                        control.owner, control.node, control.bus
                    ),
                    &format!("Substation {}", sub_id),
                );
                invalid.insert(*sub_id);
            }
        }
    }

    // Assemble the indices from the surviving substations.
    let mut index = SubstationIndex {
        valid: BTreeMap::new(),
        bus_owner: BTreeMap::new(),
        bus_nodes: BTreeMap::new(),
        bus_terminals: BTreeMap::new(),
    };
    for sub in &case.substations {
        if invalid.contains(&sub.id) {
            continue;
        }
        index.valid.insert(sub.id, sub);
        for node in &sub.nodes {
            index.bus_owner.insert(node.bus, sub.id);
            index.bus_nodes.entry(node.bus).or_default().insert(node.id);
        }
        for terminal in &sub.terminals {
            index.bus_terminals.entry(terminal.bus).or_default().push(terminal);
        }
    }

    conv.stats.substations_valid = index.valid.len();
    debug!(
        total = case.substations.len(),
        valid = index.valid.len(),
        "substation validation done"
    );
    index
}

/// Check one substation in isolation; `Some(reason)` when invalid.
fn internal_invalidity(sub: &SubstationRecord) -> Option<String> {
    let mut seen: BTreeSet<NodeId> = BTreeSet::new();
    for node in &sub.nodes {
        if !seen.insert(node.id) {
            return Some(format!("node {} is declared more than once", node.id));
        }
    }

    let mut graph = TopologyGraph::new();
    for node in &sub.nodes {
        graph.add_node(node.id, Some(node.bus));
    }
    for sw in &sub.switching_devices {
        if !graph.contains(sw.node1) || !graph.contains(sw.node2) {
            return Some(format!(
                "switching device {}-{} '{}' references an undeclared node",
                sw.node1, sw.node2, sw.circuit
            ));
        }
        // open status does not affect structural validity
        graph.add_switch(sw.node1, sw.node2, sw.open);
    }

    for component in graph.switch_components().components() {
        let buses: BTreeSet<BusNum> = component
            .iter()
            .filter_map(|&n| graph.bus_of(n))
            .collect();
        if buses.len() > 1 {
            return Some(format!(
                "switch-connected nodes {:?} span {} buses",
                component
                    .iter()
                    .map(|n| n.value())
                    .collect::<Vec<_>>(),
                buses.len()
            ));
        }
    }
    None
}
