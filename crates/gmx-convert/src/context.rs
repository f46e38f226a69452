//! Per-unit context shared by one conversion run.

use gmx_core::{Kilovolts, MegavoltAmperes};

use crate::records::CaseIdent;

/// Global per-unit bases for one conversion run. Built once from the case
/// header and never mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct PerUnitContext {
    /// System base power
    pub sbase: MegavoltAmperes,
    /// Ignore declared nominal voltages; every winding resolves against
    /// its bus base voltage instead
    pub ignore_nominal_voltages: bool,
}

impl PerUnitContext {
    pub fn new(sbase: MegavoltAmperes) -> Self {
        Self {
            sbase,
            ignore_nominal_voltages: false,
        }
    }

    pub fn from_ident(ident: &CaseIdent) -> Self {
        Self {
            sbase: ident.sbase,
            ignore_nominal_voltages: ident.ignore_nominal_voltages,
        }
    }

    /// Effective nominal voltage of a winding: the declared value unless
    /// it is absent (0) or the run ignores nominal voltages, in which case
    /// the bus base voltage stands in.
    pub fn effective_nominal(&self, declared: Kilovolts, bus_base: Kilovolts) -> Kilovolts {
        if self.ignore_nominal_voltages || declared.value() == 0.0 {
            bus_base
        } else {
            declared
        }
    }
}
