//! Lab entity structures
//!
//! These mirror the records owned by the remote authority. They are plain
//! values: the client never mutates one in place, it replaces the whole
//! value when a newer version arrives.

use crate::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};

/// A mass spectrometer registered with the lab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassSpec {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub serial_number: Option<String>,
}

/// A reference material with accepted isotope values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standard {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
}

/// Reference gas installed on a mass spec from `valid_from` onwards.
///
/// A reference gas stays valid until the next reference gas of the same
/// mass spec becomes valid. The end of the window is therefore a property
/// of the [`RefGasList`], not of the gas itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefGas {
    pub id: EntityId,
    pub mass_spec_id: EntityId,
    pub valid_from: Timestamp,
    pub description: Option<String>,
    pub delta13c: Option<f64>,
    pub delta18o: Option<f64>,
}

/// Index entry for one reference gas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefGasSummary {
    pub id: EntityId,
    pub valid_from: Timestamp,
}

/// All reference gases of one mass spec, ordered by `valid_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefGasList {
    pub mass_spec_id: EntityId,
    pub ref_gases: Vec<RefGasSummary>,
}

impl RefGasList {
    /// Create a list, sorting the entries by `valid_from`.
    pub fn new(mass_spec_id: EntityId, mut ref_gases: Vec<RefGasSummary>) -> Self {
        ref_gases.sort_by_key(|summary| summary.valid_from);
        Self {
            mass_spec_id,
            ref_gases,
        }
    }

    /// An authoritative empty list, as known for a freshly created mass spec.
    pub fn empty(mass_spec_id: EntityId) -> Self {
        Self {
            mass_spec_id,
            ref_gases: Vec::new(),
        }
    }

    /// The reference gas valid at `at`: the latest one whose `valid_from`
    /// is not after `at`.
    pub fn valid_at(&self, at: Timestamp) -> Option<&RefGasSummary> {
        self.ref_gases
            .iter()
            .filter(|summary| summary.valid_from <= at)
            .max_by_key(|summary| summary.valid_from)
    }

    /// End of the validity window of `ref_gas_id` (exclusive), or `None`
    /// when it is the most recent gas.
    pub fn valid_until(&self, ref_gas_id: EntityId) -> Option<Timestamp> {
        let start = self
            .ref_gases
            .iter()
            .find(|summary| summary.id == ref_gas_id)?
            .valid_from;
        self.ref_gases
            .iter()
            .map(|summary| summary.valid_from)
            .filter(|valid_from| *valid_from > start)
            .min()
    }

    /// Check whether `ref_gas_id` is the gas valid at `at`.
    pub fn is_valid_at(&self, ref_gas_id: EntityId, at: Timestamp) -> bool {
        self.valid_at(at).map(|summary| summary.id) == Some(ref_gas_id)
    }

    pub fn is_empty(&self) -> bool {
        self.ref_gases.is_empty()
    }
}

/// Acid digestion temperature and its fractionation factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcidTemp {
    pub id: EntityId,
    pub sample_type_id: EntityId,
    pub temperature: f64,
    pub fractionation_factor: f64,
    pub description: Option<String>,
}

/// A named physical constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstant {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

impl PhysicalConstant {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
        }
    }
}

/// The full table of constants, as returned by a single constants fetch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstantTable {
    pub constants: Vec<PhysicalConstant>,
}

impl ConstantTable {
    pub fn get(&self, name: &str) -> Option<&PhysicalConstant> {
        self.constants.iter().find(|constant| constant.name == name)
    }
}
