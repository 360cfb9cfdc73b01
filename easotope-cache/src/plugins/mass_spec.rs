//! Mass spectrometers.

use crate::cache::{decode_error, Decoded, EntityPlugin, EntryView, EventUpdate};
use easotope_core::{CacheError, EntityId, MassSpec, NO_ENTITY};
use easotope_events::{Command, Event};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MassSpecKey(pub EntityId);

/// Mass specs can be created and edited from the client but never deleted.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassSpecPlugin;

impl MassSpecPlugin {
    pub const NAME: &'static str = "MassSpec";

    fn decode(result: Value) -> Result<Decoded<Self>, CacheError> {
        let mass_spec: MassSpec =
            serde_json::from_value(result).map_err(|err| decode_error(Self::NAME, err))?;
        let id = mass_spec.id;
        Ok(Decoded::single(MassSpecKey(id), mass_spec, Some(id)))
    }
}

impl EntityPlugin for MassSpecPlugin {
    type Key = MassSpecKey;
    type Value = MassSpec;
    type Params = EntityId;
    type SaveParams = MassSpec;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_key(&self, id: &EntityId) -> MassSpecKey {
        MassSpecKey(*id)
    }

    fn fetch(&self, id: &EntityId) -> Command {
        Command::fetch("mass_spec.get", json!({ "id": id }))
    }

    fn decode_fetch(&self, _id: &EntityId, result: Value) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn persist(&self, mass_spec: &MassSpec) -> Command {
        Command::save("mass_spec.save", json!({ "mass_spec": mass_spec }))
    }

    fn decode_save(
        &self,
        _mass_spec: &MassSpec,
        result: Value,
    ) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn save_key(&self, mass_spec: &MassSpec) -> Option<MassSpecKey> {
        (mass_spec.id != NO_ENTITY).then_some(MassSpecKey(mass_spec.id))
    }

    fn apply_event(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<EventUpdate<Self>> {
        match event {
            Event::MassSpecCreated { mass_spec } => vec![EventUpdate::Seed {
                key: MassSpecKey(mass_spec.id),
                value: mass_spec.clone(),
                params: Some(mass_spec.id),
            }],
            Event::MassSpecUpdated { mass_spec } => vec![EventUpdate::Replace {
                key: MassSpecKey(mass_spec.id),
                value: mass_spec.clone(),
            }],
            _ => Vec::new(),
        }
    }
}
