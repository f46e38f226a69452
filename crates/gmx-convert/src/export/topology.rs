//! Per-voltage-level topology flattening (export direction).
//!
//! A bus-breaker voltage level exports one coarse bus per host bus. A
//! node-breaker voltage level collapses internal-connection islands onto
//! representative nodes, assigns one coarse bus per switch-connected
//! component, and emits a substation block with per-substation node
//! indices. A voltage level that would need more node indices than the
//! target format allows falls back to plain coarse buses.

use std::collections::{BTreeMap, BTreeSet};

use gmx_core::{
    Attachment, BusNum, ConversionDiagnostics, Network, NodeId, PerUnit, SubstationId, SwitchKind,
    Topology, VoltageLevel,
};
use gmx_core::{Degrees, NodeBreakerTopology};
use tracing::debug;

use crate::records::{
    BusRecord, BusTypeCode, NodeRecord, SubstationRecord, SwitchingDeviceKind,
    SwitchingDeviceRecord,
};

/// The target format caps node indices per substation.
pub const MAX_SUBSTATION_NODES: usize = 999;

/// Sequential allocator for new coarse bus numbers.
#[derive(Debug)]
pub struct BusAllocator {
    next: i32,
}

impl BusAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> BusNum {
        let num = BusNum::new(self.next);
        self.next += 1;
        num
    }
}

impl Default for BusAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential allocator for substation ids.
#[derive(Debug)]
pub struct SubstationAllocator {
    next: i32,
}

impl SubstationAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> SubstationId {
        let id = SubstationId::new(self.next);
        self.next += 1;
        id
    }
}

impl Default for SubstationAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Synthesizes circuit identifiers unique per (bus-pair, kind).
///
/// A natural id is kept when it is short and free; otherwise the smallest
/// unused numeric suffix is allocated.
#[derive(Debug, Default)]
pub struct CircuitIdAllocator {
    used: BTreeMap<(BusNum, BusNum, char), BTreeSet<String>>,
}

impl CircuitIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, a: BusNum, b: BusNum, kind: char, natural: Option<&str>) -> String {
        let key = if a <= b { (a, b, kind) } else { (b, a, kind) };
        let used = self.used.entry(key).or_default();
        if let Some(natural) = natural {
            let natural = natural.trim();
            if !natural.is_empty() && natural.len() <= 2 && !used.contains(natural) {
                used.insert(natural.to_string());
                return natural.to_string();
            }
        }
        let mut n = 1u32;
        loop {
            let candidate = n.to_string();
            if !used.contains(&candidate) {
                used.insert(candidate.clone());
                return candidate;
            }
            n += 1;
        }
    }
}

/// Where an attachment landed in the flat case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSlot {
    pub bus: BusNum,
    /// Present when the attachment landed inside a substation block
    pub node: Option<(SubstationId, NodeId)>,
}

/// Attachment-to-flat-case mapping built while exporting topology.
#[derive(Debug, Default)]
pub struct ExportIndex {
    bus_slots: BTreeMap<(String, String), BusNum>,
    node_slots: BTreeMap<(String, NodeId), ExportSlot>,
}

impl ExportIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, attachment: &Attachment) -> Option<ExportSlot> {
        match attachment {
            Attachment::Bus { voltage_level, bus } => self
                .bus_slots
                .get(&(voltage_level.clone(), bus.clone()))
                .map(|num| ExportSlot {
                    bus: *num,
                    node: None,
                }),
            Attachment::Node {
                voltage_level,
                node,
            } => self
                .node_slots
                .get(&(voltage_level.clone(), *node))
                .copied(),
        }
    }
}

/// One voltage level flattened: the new coarse buses, plus a substation
/// block when node-breaker detail survived. Terminal records are appended
/// by the equipment export pass.
#[derive(Debug)]
pub struct ExportedVoltageLevel {
    pub buses: Vec<BusRecord>,
    pub substation: Option<SubstationRecord>,
}

/// Export one voltage level's topology.
pub fn export_voltage_level(
    vl: &VoltageLevel,
    network: &Network,
    bus_alloc: &mut BusAllocator,
    sub_alloc: &mut SubstationAllocator,
    circuits: &mut CircuitIdAllocator,
    index: &mut ExportIndex,
    conv: &mut ConversionDiagnostics,
) -> ExportedVoltageLevel {
    match &vl.topology {
        Topology::BusBreaker(bb) => {
            let mut host: Vec<_> = bb.buses.iter().collect();
            host.sort_by(|a, b| a.id.cmp(&b.id));
            let mut buses = Vec::with_capacity(host.len());
            for bus in host {
                let num = bus_alloc.allocate();
                buses.push(BusRecord {
                    num,
                    name: bus.id.clone(),
                    base_kv: vl.nominal_kv,
                    bus_type: bus_view(network, &vl.id, &AttachedAt::Bus(&bus.id)),
                    vm: bus.voltage.unwrap_or(PerUnit::ONE),
                    va: bus.angle.unwrap_or(Degrees(0.0)),
                });
                index
                    .bus_slots
                    .insert((vl.id.clone(), bus.id.clone()), num);
            }
            ExportedVoltageLevel {
                buses,
                substation: None,
            }
        }
        Topology::NodeBreaker(nb) => {
            export_node_breaker(vl, nb, network, bus_alloc, sub_alloc, circuits, index, conv)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn export_node_breaker(
    vl: &VoltageLevel,
    nb: &NodeBreakerTopology,
    network: &Network,
    bus_alloc: &mut BusAllocator,
    sub_alloc: &mut SubstationAllocator,
    circuits: &mut CircuitIdAllocator,
    index: &mut ExportIndex,
    conv: &mut ConversionDiagnostics,
) -> ExportedVoltageLevel {
    let graph = nb.to_graph();
    let islands = graph.connection_components();
    let electrical = graph.all_components();

    // Representative per internal-connection island: prefer a node that
    // also carries a switch edge, ties to the smallest id.
    let mut rep_of: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    for comp in islands.components() {
        let rep = comp
            .iter()
            .find(|n| graph.switch_degree(**n) > 0)
            .copied()
            .unwrap_or(comp[0]);
        for node in comp {
            rep_of.insert(*node, rep);
        }
    }
    let reps: BTreeSet<NodeId> = rep_of.values().copied().collect();

    // One coarse bus per switch+internal-connection component.
    let mut component_bus: Vec<BusNum> = Vec::with_capacity(electrical.len());
    let mut buses = Vec::with_capacity(electrical.len());
    for comp in electrical.components() {
        let num = bus_alloc.allocate();
        component_bus.push(num);
        let anchor = comp
            .iter()
            .filter_map(|n| nb.node(*n))
            .find(|n| n.voltage.is_some());
        buses.push(BusRecord {
            num,
            name: format!("{}-{}", vl.id, comp[0]),
            base_kv: vl.nominal_kv,
            bus_type: bus_view(network, &vl.id, &AttachedAt::Nodes(comp)),
            vm: anchor.and_then(|n| n.voltage).unwrap_or(PerUnit::ONE),
            va: anchor.and_then(|n| n.angle).unwrap_or(Degrees(0.0)),
        });
    }
    let bus_of_node = |node: NodeId| -> BusNum {
        component_bus[electrical.component_of(node).unwrap_or(0)]
    };

    if reps.len() > MAX_SUBSTATION_NODES {
        conv.add_fallback(
            &format!(
                "{} node indices needed, format allows {}; exporting coarse buses only",
                reps.len(),
                MAX_SUBSTATION_NODES
            ),
            &format!("VoltageLevel {}", vl.id),
        );
        for node in graph.node_ids() {
            index.node_slots.insert(
                (vl.id.clone(), node),
                ExportSlot {
                    bus: bus_of_node(node),
                    node: None,
                },
            );
        }
        return ExportedVoltageLevel {
            buses,
            substation: None,
        };
    }

    let sub_id = sub_alloc.allocate();

    // Per-substation node indices, ascending over representatives.
    let mut export_idx: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    for (i, rep) in reps.iter().enumerate() {
        export_idx.insert(*rep, NodeId::new((i + 1) as i32));
    }

    let mut node_records = Vec::with_capacity(reps.len());
    for rep in &reps {
        let host = nb.node(*rep);
        node_records.push(NodeRecord {
            id: export_idx[rep],
            name: String::new(),
            bus: bus_of_node(*rep),
            vm: host.and_then(|n| n.voltage),
            va: host.and_then(|n| n.angle),
        });
    }

    // Every node of an island exports identically through its
    // representative.
    for node in graph.node_ids() {
        let rep = rep_of.get(&node).copied().unwrap_or(node);
        index.node_slots.insert(
            (vl.id.clone(), node),
            ExportSlot {
                bus: bus_of_node(rep),
                node: Some((sub_id, export_idx[&rep])),
            },
        );
    }

    let mut switching_devices = Vec::with_capacity(nb.switches.len());
    let mut host_switches: Vec<_> = nb.switches.iter().collect();
    host_switches.sort_by(|a, b| a.id.cmp(&b.id));
    for sw in host_switches {
        let n1 = export_idx[&rep_of.get(&sw.node1).copied().unwrap_or(sw.node1)];
        let n2 = export_idx[&rep_of.get(&sw.node2).copied().unwrap_or(sw.node2)];
        if n1 == n2 {
            debug!(switch = %sw.id, "switch endpoints collapsed to one node, dropping");
            continue;
        }
        let bus1 = bus_of_node(sw.node1);
        let bus2 = bus_of_node(sw.node2);
        let natural = sw.id.rsplit('-').next();
        switching_devices.push(SwitchingDeviceRecord {
            node1: n1,
            node2: n2,
            circuit: circuits.assign(bus1, bus2, 'S', natural),
            kind: match sw.kind {
                SwitchKind::Breaker => SwitchingDeviceKind::Breaker,
                SwitchKind::Disconnector => SwitchingDeviceKind::Disconnector,
            },
            open: sw.open,
        });
    }

    ExportedVoltageLevel {
        buses,
        substation: Some(SubstationRecord {
            id: sub_id,
            name: vl.id.clone(),
            nodes: node_records,
            switching_devices,
            terminals: Vec::new(),
        }),
    }
}

enum AttachedAt<'a> {
    Bus(&'a str),
    Nodes(&'a [NodeId]),
}

impl AttachedAt<'_> {
    fn matches(&self, vl_id: &str, attachment: &Attachment) -> bool {
        match (self, attachment) {
            (AttachedAt::Bus(id), Attachment::Bus { voltage_level, bus }) => {
                voltage_level == vl_id && bus == id
            }
            (AttachedAt::Nodes(nodes), Attachment::Node {
                voltage_level,
                node,
            }) => voltage_level == vl_id && nodes.contains(node),
            _ => false,
        }
    }
}

fn rank(t: BusTypeCode) -> u8 {
    match t {
        BusTypeCode::Slack => 3,
        BusTypeCode::VoltageControlled => 2,
        BusTypeCode::Generic => 1,
        BusTypeCode::Disconnected => 0,
    }
}

/// Reference bus-view category for a new coarse bus, by fixed priority:
/// slack-like, then voltage-controlled, then generic, then disconnected.
fn bus_view(network: &Network, vl_id: &str, at: &AttachedAt<'_>) -> BusTypeCode {
    let mut best = BusTypeCode::Disconnected;
    let mut upgrade = |candidate: BusTypeCode| {
        if rank(candidate) > rank(best) {
            best = candidate;
        }
    };

    for g in &network.generators {
        if at.matches(vl_id, &g.attachment) {
            if g.slack {
                upgrade(BusTypeCode::Slack);
            } else if g.regulating {
                upgrade(BusTypeCode::VoltageControlled);
            } else {
                upgrade(BusTypeCode::Generic);
            }
        }
    }
    for l in &network.loads {
        if at.matches(vl_id, &l.attachment) {
            upgrade(BusTypeCode::Generic);
        }
    }
    for s in &network.shunts {
        if at.matches(vl_id, &s.attachment) {
            upgrade(BusTypeCode::Generic);
        }
    }
    for line in &network.lines {
        if at.matches(vl_id, &line.end1) {
            upgrade(BusTypeCode::Generic);
        }
        if let gmx_core::LineEnd::Attached(end2) = &line.end2 {
            if at.matches(vl_id, end2) {
                upgrade(BusTypeCode::Generic);
            }
        }
    }
    for t in &network.transformers_2w {
        if at.matches(vl_id, &t.end1) || at.matches(vl_id, &t.end2) {
            upgrade(BusTypeCode::Generic);
        }
    }
    for t in &network.transformers_3w {
        for leg in &t.legs {
            if at.matches(vl_id, &leg.end) {
                upgrade(BusTypeCode::Generic);
            }
        }
    }
    best
}
