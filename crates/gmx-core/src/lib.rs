//! # gmx-core: Grid Model Exchange Core
//!
//! Data structures shared by both directions of the model conversion:
//! the hierarchical network model (voltage levels that are either
//! bus-breaker or node-breaker), the equipment attached to it, and the
//! topology-graph primitives the converters run on.
//!
//! ## Design Philosophy
//!
//! A substation is either simple enough to be a set of named buses
//! ("bus-breaker") or rich enough to be a graph of numbered nodes joined by
//! switches and internal connections ("node-breaker"). Which one a voltage
//! level gets is decided by the conversion pipeline, never by this crate:
//! the model can represent both, and every equipment terminal records
//! explicitly whether it lands on a bus or on a node.
//!
//! - Type-safe ids: [`BusNum`], [`NodeId`], [`SubstationId`] are distinct
//!   newtypes, so a tabular bus number can never be used as a node id.
//! - Closed equipment taxonomy: [`EquipmentKind`] is matched exhaustively,
//!   so adding a kind is a compile-time-checked change.
//! - Deterministic iteration: voltage levels, nodes and switches expose
//!   ordered walks so two conversion runs produce identical output.
//!
//! ## Quick Start
//!
//! ```rust
//! use gmx_core::*;
//!
//! let mut network = Network::new();
//! network.voltage_levels.push(VoltageLevel {
//!     id: "VL-400".to_string(),
//!     nominal_kv: Kilovolts(400.0),
//!     topology: Topology::BusBreaker(BusBreakerTopology {
//!         buses: vec![Bus {
//!             id: "B-400".to_string(),
//!             voltage: Some(PerUnit(1.02)),
//!             angle: Some(Degrees(-3.5)),
//!         }],
//!     }),
//! });
//! network.loads.push(Load {
//!     id: "L1".to_string(),
//!     attachment: Attachment::Bus {
//!         voltage_level: "VL-400".to_string(),
//!         bus: "B-400".to_string(),
//!     },
//!     p: Megawatts(120.0),
//!     q: Megavars(35.0),
//! });
//!
//! assert_eq!(network.stats().num_loads, 1);
//! ```
//!
//! ## Modules
//!
//! - [`graph`] - topology multigraph and union-find connectivity
//! - [`diagnostics`] - warning/error collection for conversion runs
//! - [`error`] - unified [`GmxError`] type
//! - [`units`] - newtype wrappers for physical quantities

use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod units;

pub use diagnostics::{
    ConversionDiagnostics, ConversionStats, DiagnosticIssue, Diagnostics, Severity,
};
pub use error::{GmxError, GmxResult};
pub use graph::{ComponentSet, EdgeKind, TopologyEdge, TopologyGraph};
pub use units::{Degrees, Kilovolts, Megavars, MegavoltAmperes, Megawatts, Ohms, PerUnit, Siemens};

// Newtype wrappers for ids for type safety
/// Coarse bus number in the tabular exchange format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BusNum(i32);

/// Node id, unique within one substation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(i32);

/// Substation record id in the tabular exchange format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubstationId(i32);

impl BusNum {
    #[inline]
    pub const fn new(value: i32) -> Self {
        BusNum(value)
    }
    #[inline]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl NodeId {
    #[inline]
    pub const fn new(value: i32) -> Self {
        NodeId(value)
    }
    #[inline]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl SubstationId {
    #[inline]
    pub const fn new(value: i32) -> Self {
        SubstationId(value)
    }
    #[inline]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for BusNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for SubstationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed taxonomy of equipment kinds handled by the converters.
///
/// Matched exhaustively everywhere; the compiler flags every site when a
/// kind is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EquipmentKind {
    Load,
    Generator,
    FixedShunt,
    Line,
    TwoWindingTransformer,
    ThreeWindingTransformer,
    Facts,
    HvdcConverter,
}

impl EquipmentKind {
    /// Short mnemonic used in synthesized ids and diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            EquipmentKind::Load => "LD",
            EquipmentKind::Generator => "GN",
            EquipmentKind::FixedShunt => "SH",
            EquipmentKind::Line => "LN",
            EquipmentKind::TwoWindingTransformer => "T2",
            EquipmentKind::ThreeWindingTransformer => "T3",
            EquipmentKind::Facts => "FC",
            EquipmentKind::HvdcConverter => "DC",
        }
    }

    /// True for equipment with more than two electrical ends, which needs
    /// "other bus" references synthesized on export.
    pub fn is_multi_terminal(&self) -> bool {
        matches!(
            self,
            EquipmentKind::ThreeWindingTransformer
                | EquipmentKind::Facts
                | EquipmentKind::HvdcConverter
        )
    }
}

impl std::fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

// =============================================================================
// Hierarchical topology
// =============================================================================

/// Named bus of a bus-breaker voltage level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: String,
    /// Voltage magnitude, when a measurement was present in the source
    pub voltage: Option<PerUnit>,
    /// Voltage angle, when a measurement was present in the source
    pub angle: Option<Degrees>,
}

/// Numbered node of a node-breaker voltage level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: NodeId,
    pub voltage: Option<PerUnit>,
    pub angle: Option<Degrees>,
}

/// Switching device kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchKind {
    Breaker,
    Disconnector,
}

/// Switch edge between two nodes of the same voltage level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    pub id: String,
    pub kind: SwitchKind,
    pub node1: NodeId,
    pub node2: NodeId,
    pub open: bool,
}

/// Zero-impedance, always-closed connection between two nodes.
///
/// Unlike a [`Switch`] it carries no open/closed state and needs no
/// circuit id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InternalConnection {
    pub node1: NodeId,
    pub node2: NodeId,
}

/// Busbar-section placeholder occupying a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusbarSection {
    pub id: String,
    pub node: NodeId,
}

/// Node-breaker topology of one voltage level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeBreakerTopology {
    pub nodes: Vec<TopologyNode>,
    pub switches: Vec<Switch>,
    pub internal_connections: Vec<InternalConnection>,
    pub busbar_sections: Vec<BusbarSection>,
}

impl NodeBreakerTopology {
    /// Build the flat topology graph over this voltage level's nodes.
    pub fn to_graph(&self) -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        for node in &self.nodes {
            graph.add_node(node.id, None);
        }
        for sw in &self.switches {
            graph.add_switch(sw.node1, sw.node2, sw.open);
        }
        for ic in &self.internal_connections {
            graph.add_internal_connection(ic.node1, ic.node2);
        }
        graph
    }

    /// Node lookup by id.
    pub fn node(&self, id: NodeId) -> Option<&TopologyNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Bus-breaker topology of one voltage level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusBreakerTopology {
    pub buses: Vec<Bus>,
}

/// Topology representation chosen for a voltage level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Topology {
    BusBreaker(BusBreakerTopology),
    NodeBreaker(NodeBreakerTopology),
}

/// One voltage level of the hierarchical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageLevel {
    pub id: String,
    pub nominal_kv: Kilovolts,
    pub topology: Topology,
}

impl VoltageLevel {
    pub fn is_node_breaker(&self) -> bool {
        matches!(self.topology, Topology::NodeBreaker(_))
    }
}

// =============================================================================
// Equipment terminals
// =============================================================================

/// Where a piece of equipment connects to the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attachment {
    Bus { voltage_level: String, bus: String },
    Node { voltage_level: String, node: NodeId },
}

impl Attachment {
    pub fn voltage_level(&self) -> &str {
        match self {
            Attachment::Bus { voltage_level, .. } => voltage_level,
            Attachment::Node { voltage_level, .. } => voltage_level,
        }
    }
}

/// Second end of a line: either attached normally, or dangling at a
/// boundary point that may declare its own base voltage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LineEnd {
    Attached(Attachment),
    Boundary { base_kv: Option<Kilovolts> },
}

// =============================================================================
// Equipment
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub id: String,
    pub attachment: Attachment,
    pub p: Megawatts,
    pub q: Megavars,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generator {
    pub id: String,
    pub attachment: Attachment,
    pub p: Megawatts,
    pub q: Megavars,
    pub voltage_setpoint: Option<PerUnit>,
    /// Actively regulating voltage at its terminal or a remote point
    pub regulating: bool,
    /// Slack machine of its synchronous area
    pub slack: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shunt {
    pub id: String,
    pub attachment: Attachment,
    pub g: Siemens,
    pub b: Siemens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: String,
    pub end1: Attachment,
    pub end2: LineEnd,
    pub r: Ohms,
    pub x: Ohms,
    pub g: Siemens,
    pub b: Siemens,
}

impl Line {
    pub fn is_dangling(&self) -> bool {
        matches!(self.end2, LineEnd::Boundary { .. })
    }
}

/// Tap changer flavor: ratio steps or phase-angle steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapKind {
    Ratio,
    Phase,
}

/// One discrete tap position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TapStep {
    pub ratio: f64,
    pub angle: Degrees,
    /// Local corrections in percent of the transformer's base values
    pub r_pct: f64,
    pub x_pct: f64,
    pub g_pct: f64,
    pub b_pct: f64,
}

impl TapStep {
    /// Pass-through step: nominal ratio, no shift, no corrections.
    pub fn neutral() -> Self {
        Self {
            ratio: 1.0,
            angle: Degrees(0.0),
            r_pct: 0.0,
            x_pct: 0.0,
            g_pct: 0.0,
            b_pct: 0.0,
        }
    }
}

/// Discretized tap-changer table with a resolved current position.
///
/// Positions are 0-indexed. Steps are monotonic in the physical quantity
/// that drives them: ratio for [`TapKind::Ratio`], angle for
/// [`TapKind::Phase`]. Immutable after conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapChanger {
    pub kind: TapKind,
    pub steps: Vec<TapStep>,
    pub position: usize,
}

impl TapChanger {
    /// Single-step pass-through tap changer.
    pub fn neutral(kind: TapKind) -> Self {
        Self {
            kind,
            steps: vec![TapStep::neutral()],
            position: 0,
        }
    }

    /// The step at the resolved position.
    pub fn current_step(&self) -> &TapStep {
        &self.steps[self.position]
    }

    /// Verify monotonicity of the driving quantity across steps.
    pub fn is_monotonic(&self) -> bool {
        let values: Vec<f64> = self
            .steps
            .iter()
            .map(|s| match self.kind {
                TapKind::Ratio => s.ratio,
                TapKind::Phase => s.angle.value(),
            })
            .collect();
        values.windows(2).all(|w| w[0] <= w[1]) || values.windows(2).all(|w| w[0] >= w[1])
    }
}

/// Two-winding transformer with the ratio and shunt already relocated to
/// end 1; series impedance is expressed at end 2's voltage base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoWindingTransformer {
    pub id: String,
    pub end1: Attachment,
    pub end2: Attachment,
    pub rated_u1: Kilovolts,
    pub rated_u2: Kilovolts,
    pub r: Ohms,
    pub x: Ohms,
    pub g: Siemens,
    pub b: Siemens,
    pub tap_changer: Option<TapChanger>,
}

/// One leg of a three-winding transformer (network end towards the star
/// node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerLeg {
    pub end: Attachment,
    pub rated_u: Kilovolts,
    pub r: Ohms,
    pub x: Ohms,
    pub g: Siemens,
    pub b: Siemens,
    pub tap_changer: Option<TapChanger>,
}

/// Three-winding transformer as a star of three legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeWindingTransformer {
    pub id: String,
    pub legs: [TransformerLeg; 3],
    /// Voltage base of the synthetic star node
    pub star_u: Kilovolts,
}

// =============================================================================
// Network container
// =============================================================================

/// The hierarchical network model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    pub voltage_levels: Vec<VoltageLevel>,
    pub loads: Vec<Load>,
    pub generators: Vec<Generator>,
    pub shunts: Vec<Shunt>,
    pub lines: Vec<Line>,
    pub transformers_2w: Vec<TwoWindingTransformer>,
    pub transformers_3w: Vec<ThreeWindingTransformer>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Voltage level lookup by id.
    pub fn voltage_level(&self, id: &str) -> Option<&VoltageLevel> {
        self.voltage_levels.iter().find(|vl| vl.id == id)
    }

    pub fn voltage_level_mut(&mut self, id: &str) -> Option<&mut VoltageLevel> {
        self.voltage_levels.iter_mut().find(|vl| vl.id == id)
    }

    /// Voltage levels in ascending id order; the stable walk the exporter
    /// relies on.
    pub fn voltage_levels_ordered(&self) -> Vec<&VoltageLevel> {
        let mut vls: Vec<&VoltageLevel> = self.voltage_levels.iter().collect();
        vls.sort_by(|a, b| a.id.cmp(&b.id));
        vls
    }

    /// All single-terminal equipment attachments grouped with their kind,
    /// in a fixed kind-then-id order.
    pub fn single_terminal_attachments(&self) -> Vec<(EquipmentKind, &str, &Attachment)> {
        let mut out: Vec<(EquipmentKind, &str, &Attachment)> = Vec::new();
        for l in &self.loads {
            out.push((EquipmentKind::Load, &l.id, &l.attachment));
        }
        for g in &self.generators {
            out.push((EquipmentKind::Generator, &g.id, &g.attachment));
        }
        for s in &self.shunts {
            out.push((EquipmentKind::FixedShunt, &s.id, &s.attachment));
        }
        out.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        out
    }

    /// Compute basic statistics about the model.
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_voltage_levels: self.voltage_levels.len(),
            num_loads: self.loads.len(),
            num_generators: self.generators.len(),
            num_shunts: self.shunts.len(),
            num_lines: self.lines.len(),
            num_transformers: self.transformers_2w.len() + self.transformers_3w.len(),
            ..NetworkStats::default()
        };
        for vl in &self.voltage_levels {
            match &vl.topology {
                Topology::BusBreaker(bb) => stats.num_buses += bb.buses.len(),
                Topology::NodeBreaker(nb) => {
                    stats.num_nodes += nb.nodes.len();
                    stats.num_switches += nb.switches.len();
                    stats.num_internal_connections += nb.internal_connections.len();
                    stats.num_busbar_sections += nb.busbar_sections.len();
                }
            }
        }
        stats
    }

    /// Validate referential integrity of the model.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.voltage_levels.is_empty() {
            diag.add_error("structure", "Model has no voltage levels");
            return;
        }

        let mut attachments: Vec<(&str, &Attachment)> = Vec::new();
        for (kind, id, att) in self.single_terminal_attachments() {
            let _ = kind;
            attachments.push((id, att));
        }
        for line in &self.lines {
            attachments.push((&line.id, &line.end1));
            if let LineEnd::Attached(att) = &line.end2 {
                attachments.push((&line.id, att));
            }
        }
        for t in &self.transformers_2w {
            attachments.push((&t.id, &t.end1));
            attachments.push((&t.id, &t.end2));
        }
        for t in &self.transformers_3w {
            for leg in &t.legs {
                attachments.push((&t.id, &leg.end));
            }
        }

        for (owner, att) in attachments {
            match self.voltage_level(att.voltage_level()) {
                None => diag.add_error_with_entity(
                    "reference",
                    &format!("terminal references unknown voltage level {}", att.voltage_level()),
                    owner,
                ),
                Some(vl) => match (att, &vl.topology) {
                    (Attachment::Bus { bus, .. }, Topology::BusBreaker(bb)) => {
                        if !bb.buses.iter().any(|b| &b.id == bus) {
                            diag.add_error_with_entity(
                                "reference",
                                &format!("terminal references unknown bus {}", bus),
                                owner,
                            );
                        }
                    }
                    (Attachment::Node { node, .. }, Topology::NodeBreaker(nb)) => {
                        if nb.node(*node).is_none() {
                            diag.add_error_with_entity(
                                "reference",
                                &format!("terminal references unknown node {}", node),
                                owner,
                            );
                        }
                    }
                    (Attachment::Bus { .. }, Topology::NodeBreaker(_)) => {
                        diag.add_error_with_entity(
                            "reference",
                            "bus terminal on a node-breaker voltage level",
                            owner,
                        );
                    }
                    (Attachment::Node { .. }, Topology::BusBreaker(_)) => {
                        diag.add_error_with_entity(
                            "reference",
                            "node terminal on a bus-breaker voltage level",
                            owner,
                        );
                    }
                },
            }
        }

        for vl in &self.voltage_levels {
            if let Topology::NodeBreaker(nb) = &vl.topology {
                for sw in &nb.switches {
                    if nb.node(sw.node1).is_none() || nb.node(sw.node2).is_none() {
                        diag.add_error_with_entity(
                            "reference",
                            "switch endpoint references unknown node",
                            &format!("Switch {} in {}", sw.id, vl.id),
                        );
                    }
                }
            }
        }

        for t in self
            .transformers_2w
            .iter()
            .map(|t| (&t.id, t.tap_changer.as_ref()))
            .chain(
                self.transformers_3w
                    .iter()
                    .flat_map(|t| t.legs.iter().map(move |l| (&t.id, l.tap_changer.as_ref()))),
            )
        {
            if let (id, Some(tc)) = t {
                if tc.steps.is_empty() {
                    diag.add_error_with_entity("structure", "tap changer has no steps", id);
                } else if tc.position >= tc.steps.len() {
                    diag.add_error_with_entity(
                        "structure",
                        &format!("tap position {} out of range", tc.position),
                        id,
                    );
                } else if !tc.is_monotonic() {
                    diag.add_warning_with_entity(
                        "structure",
                        "tap steps are not monotonic in the driving quantity",
                        id,
                    );
                }
            }
        }
    }
}

/// Statistics about a model's size.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStats {
    pub num_voltage_levels: usize,
    pub num_buses: usize,
    pub num_nodes: usize,
    pub num_switches: usize,
    pub num_internal_connections: usize,
    pub num_busbar_sections: usize,
    pub num_loads: usize,
    pub num_generators: usize,
    pub num_shunts: usize,
    pub num_lines: usize,
    pub num_transformers: usize,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} voltage levels ({} buses, {} nodes, {} switches), {} loads, {} gens, {} lines, {} transformers",
            self.num_voltage_levels,
            self.num_buses,
            self.num_nodes,
            self.num_switches,
            self.num_loads,
            self.num_generators,
            self.num_lines,
            self.num_transformers
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_breaker_vl() -> VoltageLevel {
        VoltageLevel {
            id: "VL-100".to_string(),
            nominal_kv: Kilovolts(220.0),
            topology: Topology::NodeBreaker(NodeBreakerTopology {
                nodes: vec![
                    TopologyNode {
                        id: NodeId::new(1),
                        voltage: Some(PerUnit(1.01)),
                        angle: Some(Degrees(0.0)),
                    },
                    TopologyNode {
                        id: NodeId::new(2),
                        voltage: None,
                        angle: None,
                    },
                ],
                switches: vec![Switch {
                    id: "SW-1".to_string(),
                    kind: SwitchKind::Breaker,
                    node1: NodeId::new(1),
                    node2: NodeId::new(2),
                    open: false,
                }],
                internal_connections: vec![],
                busbar_sections: vec![BusbarSection {
                    id: "BBS-1".to_string(),
                    node: NodeId::new(2),
                }],
            }),
        }
    }

    #[test]
    fn test_stats_counts_both_topologies() {
        let mut network = Network::new();
        network.voltage_levels.push(node_breaker_vl());
        network.voltage_levels.push(VoltageLevel {
            id: "VL-200".to_string(),
            nominal_kv: Kilovolts(110.0),
            topology: Topology::BusBreaker(BusBreakerTopology {
                buses: vec![Bus {
                    id: "B-200".to_string(),
                    voltage: None,
                    angle: None,
                }],
            }),
        });

        let stats = network.stats();
        assert_eq!(stats.num_voltage_levels, 2);
        assert_eq!(stats.num_buses, 1);
        assert_eq!(stats.num_nodes, 2);
        assert_eq!(stats.num_switches, 1);
        assert_eq!(stats.num_busbar_sections, 1);
    }

    #[test]
    fn test_validate_flags_unknown_node() {
        let mut network = Network::new();
        network.voltage_levels.push(node_breaker_vl());
        network.loads.push(Load {
            id: "L1".to_string(),
            attachment: Attachment::Node {
                voltage_level: "VL-100".to_string(),
                node: NodeId::new(99),
            },
            p: Megawatts(10.0),
            q: Megavars(2.0),
        });

        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag.has_errors());
        assert!(diag.errors().any(|i| i.message.contains("unknown node")));
    }

    #[test]
    fn test_validate_flags_topology_mismatch() {
        let mut network = Network::new();
        network.voltage_levels.push(node_breaker_vl());
        network.loads.push(Load {
            id: "L1".to_string(),
            attachment: Attachment::Bus {
                voltage_level: "VL-100".to_string(),
                bus: "B-1".to_string(),
            },
            p: Megawatts(10.0),
            q: Megavars(2.0),
        });

        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag
            .errors()
            .any(|i| i.message.contains("node-breaker voltage level")));
    }

    #[test]
    fn test_validate_flags_tap_position_out_of_range() {
        let mut network = Network::new();
        network.voltage_levels.push(node_breaker_vl());
        network.transformers_2w.push(TwoWindingTransformer {
            id: "T1".to_string(),
            end1: Attachment::Node {
                voltage_level: "VL-100".to_string(),
                node: NodeId::new(1),
            },
            end2: Attachment::Node {
                voltage_level: "VL-100".to_string(),
                node: NodeId::new(2),
            },
            rated_u1: Kilovolts(220.0),
            rated_u2: Kilovolts(110.0),
            r: Ohms(0.5),
            x: Ohms(5.0),
            g: Siemens(0.0),
            b: Siemens(0.0),
            tap_changer: Some(TapChanger {
                kind: TapKind::Ratio,
                steps: vec![TapStep::neutral()],
                position: 3,
            }),
        });

        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag.errors().any(|i| i.message.contains("out of range")));
    }

    #[test]
    fn test_tap_changer_monotonicity() {
        let mut tc = TapChanger {
            kind: TapKind::Ratio,
            steps: vec![
                TapStep {
                    ratio: 0.9,
                    ..TapStep::neutral()
                },
                TapStep {
                    ratio: 1.0,
                    ..TapStep::neutral()
                },
                TapStep {
                    ratio: 1.1,
                    ..TapStep::neutral()
                },
            ],
            position: 1,
        };
        assert!(tc.is_monotonic());
        assert_eq!(tc.current_step().ratio, 1.0);

        tc.steps[2].ratio = 0.95;
        assert!(!tc.is_monotonic());
    }

    #[test]
    fn test_voltage_levels_ordered() {
        let mut network = Network::new();
        for id in ["VL-B", "VL-A", "VL-C"] {
            network.voltage_levels.push(VoltageLevel {
                id: id.to_string(),
                nominal_kv: Kilovolts(110.0),
                topology: Topology::BusBreaker(BusBreakerTopology::default()),
            });
        }
        let ordered: Vec<&str> = network
            .voltage_levels_ordered()
            .iter()
            .map(|vl| vl.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["VL-A", "VL-B", "VL-C"]);
    }

    #[test]
    fn test_node_breaker_to_graph() {
        let vl = node_breaker_vl();
        if let Topology::NodeBreaker(nb) = &vl.topology {
            let graph = nb.to_graph();
            assert_eq!(graph.node_count(), 2);
            assert_eq!(graph.switch_components().len(), 1);
        } else {
            panic!("expected node-breaker topology");
        }
    }

    #[test]
    fn test_equipment_kind_is_closed_and_multi_terminal() {
        assert!(EquipmentKind::ThreeWindingTransformer.is_multi_terminal());
        assert!(!EquipmentKind::Line.is_multi_terminal());
        assert_eq!(EquipmentKind::Generator.mnemonic(), "GN");
    }

    #[test]
    fn test_model_serde_roundtrip() {
        let mut network = Network::new();
        network.voltage_levels.push(node_breaker_vl());
        let json = serde_json::to_string(&network).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stats().num_nodes, 2);
    }
}
