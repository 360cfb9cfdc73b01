//! Acid digestion temperatures.

use crate::cache::{decode_error, Decoded, EntityPlugin, EntryView, EventUpdate};
use easotope_core::{AcidTemp, CacheError, EntityId, NO_ENTITY};
use easotope_events::{Command, Event};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AcidTempKey(pub EntityId);

#[derive(Debug, Clone, Copy, Default)]
pub struct AcidTempPlugin;

impl AcidTempPlugin {
    pub const NAME: &'static str = "AcidTemp";

    fn decode(result: Value) -> Result<Decoded<Self>, CacheError> {
        let acid_temp: AcidTemp =
            serde_json::from_value(result).map_err(|err| decode_error(Self::NAME, err))?;
        let id = acid_temp.id;
        Ok(Decoded::single(AcidTempKey(id), acid_temp, Some(id)))
    }
}

impl EntityPlugin for AcidTempPlugin {
    type Key = AcidTempKey;
    type Value = AcidTemp;
    type Params = EntityId;
    type SaveParams = AcidTemp;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_key(&self, id: &EntityId) -> AcidTempKey {
        AcidTempKey(*id)
    }

    fn fetch(&self, id: &EntityId) -> Command {
        Command::fetch("acid_temp.get", json!({ "id": id }))
    }

    fn decode_fetch(&self, _id: &EntityId, result: Value) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn persist(&self, acid_temp: &AcidTemp) -> Command {
        Command::save("acid_temp.save", json!({ "acid_temp": acid_temp }))
    }

    fn decode_save(
        &self,
        _acid_temp: &AcidTemp,
        result: Value,
    ) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn save_key(&self, acid_temp: &AcidTemp) -> Option<AcidTempKey> {
        (acid_temp.id != NO_ENTITY).then_some(AcidTempKey(acid_temp.id))
    }

    // Acid temperatures are deleted through sample type administration on
    // the server, so only the event side of deletion exists here.
    fn keys_to_delete_on(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<AcidTempKey> {
        match event {
            Event::AcidTempDeleted { id } => vec![AcidTempKey(*id)],
            _ => Vec::new(),
        }
    }

    fn apply_event(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<EventUpdate<Self>> {
        match event {
            Event::AcidTempUpdated { acid_temp } => vec![EventUpdate::Replace {
                key: AcidTempKey(acid_temp.id),
                value: acid_temp.clone(),
            }],
            _ => Vec::new(),
        }
    }
}
