//! Type-erased view over cached lab records.
//!
//! Several caches feed a single consumer in the dependency engine. Rather
//! than downcasting trait objects, every cached value converts into one
//! [`LabObject`] variant.

use crate::{AcidTemp, EntityId, MassSpec, PhysicalConstant, RefGas, RefGasList, Standard};
use serde::{Deserialize, Serialize};

/// Any record the client caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LabObject {
    MassSpec(MassSpec),
    Standard(Standard),
    RefGas(RefGas),
    RefGasList(RefGasList),
    AcidTemp(AcidTemp),
    Constant(PhysicalConstant),
}

impl LabObject {
    /// Get the object type as a string for logging/debugging.
    pub fn object_type(&self) -> &'static str {
        match self {
            LabObject::MassSpec(_) => "MassSpec",
            LabObject::Standard(_) => "Standard",
            LabObject::RefGas(_) => "RefGas",
            LabObject::RefGasList(_) => "RefGasList",
            LabObject::AcidTemp(_) => "AcidTemp",
            LabObject::Constant(_) => "Constant",
        }
    }

    /// Entity id of the record, if it has one.
    /// Reference gas lists answer with their mass spec id.
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            LabObject::MassSpec(m) => Some(m.id),
            LabObject::Standard(s) => Some(s.id),
            LabObject::RefGas(r) => Some(r.id),
            LabObject::RefGasList(l) => Some(l.mass_spec_id),
            LabObject::AcidTemp(a) => Some(a.id),
            LabObject::Constant(_) => None,
        }
    }

    pub fn as_ref_gas(&self) -> Option<&RefGas> {
        match self {
            LabObject::RefGas(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ref_gas_list(&self) -> Option<&RefGasList> {
        match self {
            LabObject::RefGasList(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_acid_temp(&self) -> Option<&AcidTemp> {
        match self {
            LabObject::AcidTemp(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_standard(&self) -> Option<&Standard> {
        match self {
            LabObject::Standard(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&PhysicalConstant> {
        match self {
            LabObject::Constant(c) => Some(c),
            _ => None,
        }
    }
}

impl From<MassSpec> for LabObject {
    fn from(value: MassSpec) -> Self {
        LabObject::MassSpec(value)
    }
}

impl From<Standard> for LabObject {
    fn from(value: Standard) -> Self {
        LabObject::Standard(value)
    }
}

impl From<RefGas> for LabObject {
    fn from(value: RefGas) -> Self {
        LabObject::RefGas(value)
    }
}

impl From<RefGasList> for LabObject {
    fn from(value: RefGasList) -> Self {
        LabObject::RefGasList(value)
    }
}

impl From<AcidTemp> for LabObject {
    fn from(value: AcidTemp) -> Self {
        LabObject::AcidTemp(value)
    }
}

impl From<PhysicalConstant> for LabObject {
    fn from(value: PhysicalConstant) -> Self {
        LabObject::Constant(value)
    }
}
