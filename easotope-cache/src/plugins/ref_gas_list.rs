//! Reference gas index per mass spec.
//!
//! The list is derived server-side from the reference gas table. It is
//! read-only: it changes only through reference gas edits, which trigger a
//! reload of the affected mass spec's list.

use crate::cache::{decode_error, Decoded, EntityPlugin, EntryView, EventUpdate};
use easotope_core::{CacheError, EntityId, RefGasList};
use easotope_events::{Command, Event};
use serde_json::{json, Value};

/// Keyed by mass spec id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefGasListKey(pub EntityId);

#[derive(Debug, Clone, Copy, Default)]
pub struct RefGasListPlugin;

impl RefGasListPlugin {
    pub const NAME: &'static str = "RefGasList";
}

impl EntityPlugin for RefGasListPlugin {
    type Key = RefGasListKey;
    type Value = RefGasList;
    type Params = EntityId;
    type SaveParams = ();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_key(&self, mass_spec_id: &EntityId) -> RefGasListKey {
        RefGasListKey(*mass_spec_id)
    }

    fn fetch(&self, mass_spec_id: &EntityId) -> Command {
        Command::fetch("ref_gas.list", json!({ "mass_spec_id": mass_spec_id }))
    }

    fn decode_fetch(
        &self,
        _mass_spec_id: &EntityId,
        result: Value,
    ) -> Result<Decoded<Self>, CacheError> {
        let list: RefGasList =
            serde_json::from_value(result).map_err(|err| decode_error(Self::NAME, err))?;
        // The wire order is not guaranteed.
        let list = RefGasList::new(list.mass_spec_id, list.ref_gases);
        let mass_spec_id = list.mass_spec_id;
        Ok(Decoded::single(
            RefGasListKey(mass_spec_id),
            list,
            Some(mass_spec_id),
        ))
    }

    fn keys_to_reload_on(&self, event: &Event, view: &EntryView<'_, Self>) -> Vec<RefGasListKey> {
        let (ref_gas_id, mass_spec_id) = match event {
            Event::RefGasUpdated { ref_gas } => (ref_gas.id, ref_gas.mass_spec_id),
            Event::RefGasDeleted { id, mass_spec_id } => (*id, *mass_spec_id),
            _ => return Vec::new(),
        };
        // A gas moved to another mass spec must also leave its old list.
        view.keys()
            .filter(|key| {
                key.0 == mass_spec_id
                    || view.value(key).is_some_and(|list| {
                        list.ref_gases.iter().any(|summary| summary.id == ref_gas_id)
                    })
            })
            .copied()
            .collect()
    }

    fn reload_params(&self, key: &RefGasListKey) -> Option<EntityId> {
        Some(key.0)
    }

    fn apply_event(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<EventUpdate<Self>> {
        match event {
            // A new mass spec has no reference gases. Seeded without fetch
            // parameters: this is authoritative until a gas event says
            // otherwise.
            Event::MassSpecCreated { mass_spec } => vec![EventUpdate::Seed {
                key: RefGasListKey(mass_spec.id),
                value: RefGasList::empty(mass_spec.id),
                params: None,
            }],
            _ => Vec::new(),
        }
    }
}
