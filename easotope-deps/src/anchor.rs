//! The record a calculation step is resolved against.

use easotope_core::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};

/// Identity and date of the measurement being calculated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub mass_spec_id: EntityId,
    pub acid_temp_id: EntityId,
    /// Set when the measurement is of a reference material.
    pub standard_id: Option<EntityId>,
    pub acquired_at: Timestamp,
}

impl Anchor {
    pub fn new(mass_spec_id: EntityId, acid_temp_id: EntityId, acquired_at: Timestamp) -> Self {
        Self {
            mass_spec_id,
            acid_temp_id,
            standard_id: None,
            acquired_at,
        }
    }

    pub fn with_standard(mut self, standard_id: EntityId) -> Self {
        self.standard_id = Some(standard_id);
        self
    }

    pub fn with_acquired_at(mut self, acquired_at: Timestamp) -> Self {
        self.acquired_at = acquired_at;
        self
    }
}
