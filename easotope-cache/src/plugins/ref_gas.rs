//! Reference gases.

use crate::cache::{decode_error, Decoded, EntityPlugin, EntryView, EventUpdate};
use easotope_core::{CacheError, EntityId, RefGas, NO_ENTITY};
use easotope_events::{Command, Event};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefGasKey(pub EntityId);

#[derive(Debug, Clone, Copy, Default)]
pub struct RefGasPlugin;

impl RefGasPlugin {
    pub const NAME: &'static str = "RefGas";

    fn decode(result: Value) -> Result<Decoded<Self>, CacheError> {
        let ref_gas: RefGas =
            serde_json::from_value(result).map_err(|err| decode_error(Self::NAME, err))?;
        let id = ref_gas.id;
        Ok(Decoded::single(RefGasKey(id), ref_gas, Some(id)))
    }
}

impl EntityPlugin for RefGasPlugin {
    type Key = RefGasKey;
    type Value = RefGas;
    type Params = EntityId;
    type SaveParams = RefGas;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_key(&self, id: &EntityId) -> RefGasKey {
        RefGasKey(*id)
    }

    fn fetch(&self, id: &EntityId) -> Command {
        Command::fetch("ref_gas.get", json!({ "id": id }))
    }

    fn decode_fetch(&self, _id: &EntityId, result: Value) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn persist(&self, ref_gas: &RefGas) -> Command {
        Command::save("ref_gas.save", json!({ "ref_gas": ref_gas }))
    }

    fn decode_save(&self, _ref_gas: &RefGas, result: Value) -> Result<Decoded<Self>, CacheError> {
        Self::decode(result)
    }

    fn save_key(&self, ref_gas: &RefGas) -> Option<RefGasKey> {
        (ref_gas.id != NO_ENTITY).then_some(RefGasKey(ref_gas.id))
    }

    fn delete(&self, id: &EntityId) -> Command {
        Command::delete("ref_gas.delete", json!({ "id": id }))
    }

    fn keys_to_delete_on(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<RefGasKey> {
        match event {
            Event::RefGasDeleted { id, .. } => vec![RefGasKey(*id)],
            _ => Vec::new(),
        }
    }

    fn apply_event(&self, event: &Event, _view: &EntryView<'_, Self>) -> Vec<EventUpdate<Self>> {
        match event {
            Event::RefGasUpdated { ref_gas } => vec![EventUpdate::Replace {
                key: RefGasKey(ref_gas.id),
                value: ref_gas.clone(),
            }],
            _ => Vec::new(),
        }
    }
}
