//! Record structs of the flat tabular exchange format.
//!
//! These are the in-memory shape of the exchange file's ordered sections.
//! The reader fills them, the writer serializes them, and the conversion
//! pipelines consume them; nothing here interprets per-unit conventions
//! or topology.

use gmx_core::{
    BusNum, Degrees, EquipmentKind, Kilovolts, Megavars, MegavoltAmperes, Megawatts, NodeId,
    PerUnit, SubstationId,
};
use serde::{Deserialize, Serialize};

/// Case-wide header values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseIdent {
    /// System base power
    pub sbase: MegavoltAmperes,
    /// Treat declared nominal voltages as absent during ratio resolution
    pub ignore_nominal_voltages: bool,
    pub title: String,
}

impl Default for CaseIdent {
    fn default() -> Self {
        Self {
            sbase: MegavoltAmperes(100.0),
            ignore_nominal_voltages: false,
            title: String::new(),
        }
    }
}

/// Bus-view reference category, in export priority order.
///
/// The numeric codes are the exchange format's bus type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BusTypeCode {
    /// Slack-like bus (code 3)
    Slack,
    /// Voltage-controlled bus (code 2)
    VoltageControlled,
    /// Generic load bus (code 1)
    Generic,
    /// Disconnected bus (code 4)
    Disconnected,
}

impl BusTypeCode {
    pub fn code(&self) -> i32 {
        match self {
            BusTypeCode::Slack => 3,
            BusTypeCode::VoltageControlled => 2,
            BusTypeCode::Generic => 1,
            BusTypeCode::Disconnected => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(BusTypeCode::Generic),
            2 => Some(BusTypeCode::VoltageControlled),
            3 => Some(BusTypeCode::Slack),
            4 => Some(BusTypeCode::Disconnected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusRecord {
    pub num: BusNum,
    pub name: String,
    pub base_kv: Kilovolts,
    pub bus_type: BusTypeCode,
    pub vm: PerUnit,
    pub va: Degrees,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRecord {
    pub bus: BusNum,
    pub id: String,
    pub in_service: bool,
    pub p: Megawatts,
    pub q: Megavars,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorRecord {
    pub bus: BusNum,
    pub id: String,
    pub in_service: bool,
    pub p: Megawatts,
    pub q: Megavars,
    pub voltage_setpoint: PerUnit,
    /// Remote regulated bus (0 = own bus)
    pub regulated_bus: Option<BusNum>,
    /// Remote regulated node within the regulated bus's substation
    pub regulated_node: Option<NodeId>,
}

/// One node declaration inside a substation block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    /// Coarse bus claiming this node
    pub bus: BusNum,
    pub vm: Option<PerUnit>,
    pub va: Option<Degrees>,
}

/// Switching-device kind codes of the exchange format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchingDeviceKind {
    /// Code 1
    Breaker,
    /// Code 2
    Disconnector,
}

impl SwitchingDeviceKind {
    pub fn code(&self) -> i32 {
        match self {
            SwitchingDeviceKind::Breaker => 1,
            SwitchingDeviceKind::Disconnector => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(SwitchingDeviceKind::Breaker),
            2 => Some(SwitchingDeviceKind::Disconnector),
            _ => None,
        }
    }
}

/// One switching device inside a substation block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchingDeviceRecord {
    pub node1: NodeId,
    pub node2: NodeId,
    /// Circuit id, unique within the substation
    pub circuit: String,
    pub kind: SwitchingDeviceKind,
    pub open: bool,
}

/// One equipment terminal inside a substation block: the (bus, node)
/// placement of a piece of equipment, plus up to two "other bus" ends for
/// multi-terminal equipment (0-padded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalRecord {
    pub bus: BusNum,
    pub node: NodeId,
    pub kind: EquipmentKind,
    pub equipment_id: String,
    pub other_bus_1: Option<BusNum>,
    pub other_bus_2: Option<BusNum>,
}

/// A full substation block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstationRecord {
    pub id: SubstationId,
    pub name: String,
    pub nodes: Vec<NodeRecord>,
    pub switching_devices: Vec<SwitchingDeviceRecord>,
    pub terminals: Vec<TerminalRecord>,
}

impl SubstationRecord {
    /// Largest declared node id; seed for the synthetic-node allocator.
    pub fn max_node_id(&self) -> i32 {
        self.nodes.iter().map(|n| n.id.value()).max().unwrap_or(0)
    }
}

/// Per-winding raw parameters of a transformer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindingRecord {
    /// Declared tap value; interpretation depends on CW
    pub windv: f64,
    /// Declared nominal voltage (0 = use bus base)
    pub nomv: Kilovolts,
    /// Declared phase shift
    pub ang: Degrees,
    /// Tap bounds (same units as windv for a ratio code, degrees for a
    /// phase-shifter code)
    pub rma: f64,
    pub rmi: f64,
    /// Number of discrete tap positions
    pub ntp: usize,
    /// Control mode: 0 fixed, ±1 ratio tap changer, ±3 phase shifter
    pub cod: i32,
}

impl Default for WindingRecord {
    fn default() -> Self {
        Self {
            windv: 1.0,
            nomv: Kilovolts(0.0),
            ang: Degrees(0.0),
            rma: 1.1,
            rmi: 0.9,
            ntp: 1,
            cod: 0,
        }
    }
}

/// Raw transformer record; two-winding when `bus3` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerRecord {
    pub bus1: BusNum,
    pub bus2: BusNum,
    pub bus3: Option<BusNum>,
    pub circuit: String,
    pub name: String,
    pub in_service: bool,
    /// Winding ratio convention code
    pub cw: i32,
    /// Impedance convention code
    pub cz: i32,
    /// Magnetizing admittance convention code
    pub cm: i32,
    /// Magnetizing values; interpretation depends on CM
    pub mag1: f64,
    pub mag2: f64,
    pub r12: f64,
    pub x12: f64,
    pub sbase12: MegavoltAmperes,
    pub r23: f64,
    pub x23: f64,
    pub sbase23: MegavoltAmperes,
    pub r31: f64,
    pub x31: f64,
    pub sbase31: MegavoltAmperes,
    pub windings: [WindingRecord; 3],
}

impl TransformerRecord {
    pub fn is_three_winding(&self) -> bool {
        self.bus3.is_some()
    }

    /// Identifier used in error messages and diagnostics.
    pub fn label(&self) -> String {
        match self.bus3 {
            Some(k) => format!("T-{}-{}-{}-{}", self.bus1, self.bus2, k, self.circuit),
            None => format!("T-{}-{}-{}", self.bus1, self.bus2, self.circuit),
        }
    }
}

/// A complete tabular case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCase {
    pub ident: CaseIdent,
    pub buses: Vec<BusRecord>,
    pub loads: Vec<LoadRecord>,
    pub generators: Vec<GeneratorRecord>,
    pub transformers: Vec<TransformerRecord>,
    pub substations: Vec<SubstationRecord>,
}

impl RawCase {
    /// Bus lookup by number.
    pub fn bus(&self, num: BusNum) -> Option<&BusRecord> {
        self.buses.iter().find(|b| b.num == num)
    }
}

/// Equipment kind ↔ single-character terminal type code of the exchange
/// format.
pub fn equipment_kind_code(kind: EquipmentKind) -> &'static str {
    match kind {
        EquipmentKind::Load => "L",
        EquipmentKind::Generator => "M",
        EquipmentKind::FixedShunt => "F",
        EquipmentKind::Line => "B",
        EquipmentKind::TwoWindingTransformer => "2",
        EquipmentKind::ThreeWindingTransformer => "3",
        EquipmentKind::Facts => "N",
        EquipmentKind::HvdcConverter => "D",
    }
}

/// Inverse of [`equipment_kind_code`].
pub fn equipment_kind_from_code(code: &str) -> Option<EquipmentKind> {
    match code {
        "L" => Some(EquipmentKind::Load),
        "M" => Some(EquipmentKind::Generator),
        "F" => Some(EquipmentKind::FixedShunt),
        "B" => Some(EquipmentKind::Line),
        "2" => Some(EquipmentKind::TwoWindingTransformer),
        "3" => Some(EquipmentKind::ThreeWindingTransformer),
        "N" => Some(EquipmentKind::Facts),
        "D" => Some(EquipmentKind::HvdcConverter),
        _ => None,
    }
}
