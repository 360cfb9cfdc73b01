//! Standards: reference materials with accepted isotope values.

use crate::cache::{decode_error, Decoded, EntityPlugin, EntryView, EventUpdate};
use easotope_core::{CacheError, EntityId, Standard, NO_ENTITY};
use easotope_events::{Command, Event};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StandardKey(pub EntityId);

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPlugin;

impl StandardPlugin {
    pub const NAME: &'static str = "Standard";

    fn decode(result: Value) -> Result<Decoded<Self>, CacheError> {
        let standard: Standard =
            serde_json::from_value(result).map_err(|err| decode_error(Self::NAME, err))?;
        let id = standard.id;
        Ok(Decoded::single(StandardKey(id), standard, Some(id)))
    }
}

impl EntityPlugin for StandardPlugin {
    type Key = StandardKey;
    type Value = Standard;
    type Params = EntityId;
    type SaveParams = Standard;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_key(&self, id: &EntityId) -> StandardKey {
        StandardKey(*id)
    }

    fn fetch(&self, id: &EntityId) -> Command {
        Command::fetch("standard.get", json!({ "id": id }))
    }

    fn decode_fetch(&self, _id: &EntityId, result: Value) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn persist(&self, standard: &Standard) -> Command {
        Command::save("standard.save", json!({ "standard": standard }))
    }

    fn decode_save(
        &self,
        _standard: &Standard,
        result: Value,
    ) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn save_key(&self, standard: &Standard) -> Option<StandardKey> {
        (standard.id != NO_ENTITY).then_some(StandardKey(standard.id))
    }

    /// Standards carry no row version, so the server re-validates the same
    /// record once the caller has seen its verification request.
    fn refresh_for_resend(
        &self,
        standard: &Standard,
        _current: Option<&Standard>,
    ) -> Option<Standard> {
        Some(standard.clone())
    }

    fn delete(&self, id: &EntityId) -> Command {
        Command::delete("standard.delete", json!({ "id": id }))
    }

    fn keys_to_delete_on(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<StandardKey> {
        match event {
            Event::StandardDeleted { id } => vec![StandardKey(*id)],
            _ => Vec::new(),
        }
    }

    fn apply_event(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<EventUpdate<Self>> {
        match event {
            Event::StandardUpdated { standard } => vec![EventUpdate::Replace {
                key: StandardKey(standard.id),
                value: standard.clone(),
            }],
            Event::StandardsUpdated { standards } => standards
                .iter()
                .map(|standard| EventUpdate::Replace {
                    key: StandardKey(standard.id),
                    value: standard.clone(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
