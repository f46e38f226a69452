//! Per-voltage-level topology materialization (import direction).
//!
//! Given one voltage level's coarse-bus-set and the valid substation
//! governing it (if any), build the target topology: bus-breaker when no
//! substation governs, node-breaker otherwise. Every equipment terminal is
//! resolved to a slot (bus id or node id) that the equipment converters
//! consume afterwards.
//!
//! Creation order is a total order over ids so that converting the same
//! case twice produces byte-identical output.

use std::collections::{BTreeMap, BTreeSet};

use gmx_core::{
    Attachment, Bus, BusBreakerTopology, BusNum, BusbarSection, ConversionDiagnostics,
    EquipmentKind, InternalConnection, Kilovolts, NodeBreakerTopology, NodeId, Switch, SwitchKind,
    Topology, TopologyGraph, TopologyNode, VoltageLevel,
};
use tracing::debug;

use crate::records::{BusRecord, SubstationRecord, SwitchingDeviceKind};

/// Allocator for synthetic node ids, seeded above the largest declared id.
///
/// Passed explicitly so conversion runs stay independent; there is no
/// global counter.
#[derive(Debug, Clone, Copy)]
pub struct NodeAllocator {
    next: i32,
}

impl NodeAllocator {
    /// Seed the allocator so the first allocated id is `max + 1`.
    pub fn seeded_above(max: i32) -> Self {
        Self { next: max + 1 }
    }

    pub fn allocate(&mut self) -> NodeId {
        let id = NodeId::new(self.next);
        self.next += 1;
        id
    }
}

/// Everything the importer needs for one voltage level.
#[derive(Debug)]
pub struct VoltageLevelPlan<'a> {
    pub vl_id: String,
    pub nominal_kv: Kilovolts,
    /// The coarse-bus-set, sorted ascending by bus number
    pub buses: Vec<&'a BusRecord>,
    /// Governing valid substation, when node-breaker is possible
    pub substation: Option<&'a SubstationRecord>,
    /// Equipment expected to terminate in this voltage level, in a fixed
    /// (kind, id, bus) order; used to detect missing terminal records
    pub expected_equipment: Vec<(EquipmentKind, String, BusNum)>,
}

/// Result of importing one voltage level: the topology plus the resolved
/// equipment slots.
#[derive(Debug)]
pub struct ImportedVoltageLevel {
    pub voltage_level: VoltageLevel,
    /// Keyed by (host bus, kind, raw equipment id); the bus keeps two
    /// same-kind devices with the same id on different buses apart
    slots: BTreeMap<(BusNum, EquipmentKind, String), Attachment>,
}

impl ImportedVoltageLevel {
    /// The slot resolved for a piece of equipment, if it terminates here.
    pub fn attachment(&self, bus: BusNum, kind: EquipmentKind, id: &str) -> Option<&Attachment> {
        self.slots.get(&(bus, kind, id.to_string()))
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Import one voltage level.
pub fn import_voltage_level(
    plan: &VoltageLevelPlan<'_>,
    conv: &mut ConversionDiagnostics,
) -> ImportedVoltageLevel {
    match plan.substation {
        None => import_bus_breaker(plan),
        Some(sub) => import_node_breaker(plan, sub, conv),
    }
}

/// Bus-breaker fallback: one named bus per coarse bus, nothing else.
fn import_bus_breaker(plan: &VoltageLevelPlan<'_>) -> ImportedVoltageLevel {
    let mut buses = Vec::new();
    let mut bus_ids: BTreeMap<BusNum, String> = BTreeMap::new();
    for bus in &plan.buses {
        let id = format!("B-{}", bus.num);
        buses.push(Bus {
            id: id.clone(),
            voltage: Some(bus.vm),
            angle: Some(bus.va),
        });
        bus_ids.insert(bus.num, id);
    }

    let mut slots = BTreeMap::new();
    for (kind, id, bus) in &plan.expected_equipment {
        if let Some(bus_id) = bus_ids.get(bus) {
            slots.insert(
                (*bus, *kind, id.clone()),
                Attachment::Bus {
                    voltage_level: plan.vl_id.clone(),
                    bus: bus_id.clone(),
                },
            );
        }
    }

    ImportedVoltageLevel {
        voltage_level: VoltageLevel {
            id: plan.vl_id.clone(),
            nominal_kv: plan.nominal_kv,
            topology: Topology::BusBreaker(BusBreakerTopology { buses }),
        },
        slots,
    }
}

fn import_node_breaker(
    plan: &VoltageLevelPlan<'_>,
    sub: &SubstationRecord,
    conv: &mut ConversionDiagnostics,
) -> ImportedVoltageLevel {
    let bus_set: BTreeSet<BusNum> = plan.buses.iter().map(|b| b.num).collect();
    let bus_record: BTreeMap<BusNum, &BusRecord> =
        plan.buses.iter().map(|b| (b.num, *b)).collect();

    // Nodes owned by this voltage level's buses, ascending by id. A node
    // without its own measurement inherits its bus's solved voltage.
    let mut nodes: Vec<TopologyNode> = Vec::new();
    let mut node_bus: BTreeMap<NodeId, BusNum> = BTreeMap::new();
    let mut declared: Vec<&crate::records::NodeRecord> = sub
        .nodes
        .iter()
        .filter(|n| bus_set.contains(&n.bus))
        .collect();
    declared.sort_by_key(|n| n.id);
    for rec in &declared {
        let bus = bus_record.get(&rec.bus);
        nodes.push(TopologyNode {
            id: rec.id,
            voltage: rec.vm.or_else(|| bus.map(|b| b.vm)),
            angle: rec.va.or_else(|| bus.map(|b| b.va)),
        });
        node_bus.insert(rec.id, rec.bus);
    }

    // Switching devices whose endpoints both live here, in (node1, node2,
    // circuit) order. In a valid substation a switch can never straddle
    // two buses, so membership of one endpoint implies the other.
    let mut devices: Vec<_> = sub
        .switching_devices
        .iter()
        .filter(|d| node_bus.contains_key(&d.node1) && node_bus.contains_key(&d.node2))
        .collect();
    devices.sort_by(|a, b| {
        (a.node1, a.node2, a.circuit.as_str()).cmp(&(b.node1, b.node2, b.circuit.as_str()))
    });
    let mut switches = Vec::new();
    for dev in devices {
        switches.push(Switch {
            id: format!("{}-SW-{}-{}-{}", plan.vl_id, dev.node1, dev.node2, dev.circuit),
            kind: match dev.kind {
                SwitchingDeviceKind::Breaker => SwitchKind::Breaker,
                SwitchingDeviceKind::Disconnector => SwitchKind::Disconnector,
            },
            node1: dev.node1,
            node2: dev.node2,
            open: dev.open,
        });
    }
    conv.stats.switches += switches.len();

    // Queue of terminals per node, in (kind, equipment id) order. Equipment
    // that should terminate here but has no terminal record defaults to the
    // smallest node of its bus and goes through the same collision logic.
    let mut queue: BTreeMap<NodeId, Vec<(BusNum, EquipmentKind, String)>> = BTreeMap::new();
    let mut recorded: BTreeSet<(BusNum, EquipmentKind, String)> = BTreeSet::new();
    let mut terminals: Vec<_> = sub
        .terminals
        .iter()
        .filter(|t| bus_set.contains(&t.bus))
        .collect();
    terminals.sort_by(|a, b| {
        (a.node, a.kind, a.equipment_id.as_str()).cmp(&(b.node, b.kind, b.equipment_id.as_str()))
    });
    for t in &terminals {
        queue
            .entry(t.node)
            .or_default()
            .push((t.bus, t.kind, t.equipment_id.clone()));
        recorded.insert((t.bus, t.kind, t.equipment_id.clone()));
    }
    for (kind, id, bus) in &plan.expected_equipment {
        if recorded.contains(&(*bus, *kind, id.clone())) {
            continue;
        }
        let default_node = node_bus
            .iter()
            .filter(|(_, b)| *b == bus)
            .map(|(n, _)| *n)
            .min();
        if let Some(node) = default_node {
            conv.diagnostics.add_warning_with_entity(
                "topology",
                &format!("no terminal record for {} {}, placing on node {}", kind, id, node),
                &format!("Substation {}", sub.id),
            );
            queue.entry(node).or_default().push((*bus, *kind, id.clone()));
        }
    }

    // First terminal claims the node; each further terminal gets a fresh
    // node joined by an internal connection.
    let mut allocator = NodeAllocator::seeded_above(sub.max_node_id());
    let mut internal_connections: Vec<InternalConnection> = Vec::new();
    let mut occupied: BTreeSet<NodeId> = BTreeSet::new();
    let mut slots: BTreeMap<(BusNum, EquipmentKind, String), Attachment> = BTreeMap::new();
    let mut synthetic: Vec<TopologyNode> = Vec::new();
    for (node, entries) in &queue {
        for (i, (bus, kind, id)) in entries.iter().enumerate() {
            let target = if i == 0 {
                occupied.insert(*node);
                *node
            } else {
                let fresh = allocator.allocate();
                internal_connections.push(InternalConnection {
                    node1: *node,
                    node2: fresh,
                });
                // electrically identical point, same solved voltage
                let original = nodes.iter().find(|n| n.id == *node);
                synthetic.push(TopologyNode {
                    id: fresh,
                    voltage: original.and_then(|n| n.voltage),
                    angle: original.and_then(|n| n.angle),
                });
                occupied.insert(fresh);
                conv.stats.synthetic_nodes += 1;
                fresh
            };
            slots.insert(
                (*bus, *kind, id.clone()),
                Attachment::Node {
                    voltage_level: plan.vl_id.clone(),
                    node: target,
                },
            );
        }
    }
    conv.stats.internal_connections += internal_connections.len();
    nodes.extend(synthetic);

    // Equipment-free junction nodes become busbar-section placeholders so
    // the graph stays navigable for terminal and regulating-bus
    // resolution downstream.
    let mut switch_graph = TopologyGraph::new();
    for node in &nodes {
        switch_graph.add_node(node.id, None);
    }
    for sw in &switches {
        switch_graph.add_switch(sw.node1, sw.node2, sw.open);
    }
    let mut busbar_sections = Vec::new();
    for node in &nodes {
        if !occupied.contains(&node.id) && switch_graph.switch_degree(node.id) > 1 {
            busbar_sections.push(BusbarSection {
                id: format!("{}-BBS-{}", plan.vl_id, node.id),
                node: node.id,
            });
        }
    }
    conv.stats.busbar_sections += busbar_sections.len();

    debug!(
        vl = %plan.vl_id,
        nodes = nodes.len(),
        switches = switches.len(),
        busbars = busbar_sections.len(),
        "imported node-breaker voltage level"
    );

    ImportedVoltageLevel {
        voltage_level: VoltageLevel {
            id: plan.vl_id.clone(),
            nominal_kv: plan.nominal_kv,
            topology: Topology::NodeBreaker(NodeBreakerTopology {
                nodes,
                switches,
                internal_connections,
                busbar_sections,
            }),
        },
        slots,
    }
}
