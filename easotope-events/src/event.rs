//! Push Event Types
//!
//! Unsolicited notifications sent by the server whenever an entity changes.
//! Every cache context receives every event; each entity plugin decides
//! which of its keys an event touches.

use easotope_core::{AcidTemp, EntityId, MassSpec, RefGas, Standard};
use serde::{Deserialize, Serialize};

/// Remote-side change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // ========================================================================
    // MASS SPEC EVENTS
    // ========================================================================
    /// A new mass spec was created. It has no reference gases yet.
    MassSpecCreated {
        mass_spec: MassSpec,
    },

    MassSpecUpdated {
        mass_spec: MassSpec,
    },

    // ========================================================================
    // STANDARD EVENTS
    // ========================================================================
    StandardUpdated {
        standard: Standard,
    },

    /// Several standards changed in one transaction.
    StandardsUpdated {
        standards: Vec<Standard>,
    },

    StandardDeleted {
        id: EntityId,
    },

    // ========================================================================
    // REFERENCE GAS EVENTS
    // ========================================================================
    /// A reference gas was created or changed.
    RefGasUpdated {
        ref_gas: RefGas,
    },

    RefGasDeleted {
        id: EntityId,
        mass_spec_id: EntityId,
    },

    // ========================================================================
    // ACID TEMPERATURE EVENTS
    // ========================================================================
    AcidTempUpdated {
        acid_temp: AcidTemp,
    },

    AcidTempDeleted {
        id: EntityId,
    },

    // ========================================================================
    // CONSTANT EVENTS
    // ========================================================================
    /// The constant table changed; the server does not say which entries.
    ConstantsChanged,
}

impl Event {
    /// Get the event type as a string for logging/debugging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::MassSpecCreated { .. } => "MassSpecCreated",
            Event::MassSpecUpdated { .. } => "MassSpecUpdated",
            Event::StandardUpdated { .. } => "StandardUpdated",
            Event::StandardsUpdated { .. } => "StandardsUpdated",
            Event::StandardDeleted { .. } => "StandardDeleted",
            Event::RefGasUpdated { .. } => "RefGasUpdated",
            Event::RefGasDeleted { .. } => "RefGasDeleted",
            Event::AcidTempUpdated { .. } => "AcidTempUpdated",
            Event::AcidTempDeleted { .. } => "AcidTempDeleted",
            Event::ConstantsChanged => "ConstantsChanged",
        }
    }

    /// Check if this event announces a deletion.
    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            Event::StandardDeleted { .. } | Event::RefGasDeleted { .. } | Event::AcidTempDeleted { .. }
        )
    }
}
