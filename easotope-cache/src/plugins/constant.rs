//! Physical constants.
//!
//! The server only serves the constant table as a whole. One fetch for any
//! name therefore caches every constant, each with its own name as fetch
//! parameter so it can be reloaded on its own. A table change reloads a
//! single name for the same reason.

use crate::cache::{decode_error, Decoded, DecodedEntry, EntityPlugin, EntryView};
use easotope_core::{CacheError, ConstantTable, PhysicalConstant};
use easotope_events::{Command, Event};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstantKey(pub String);

impl ConstantKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantPlugin;

impl ConstantPlugin {
    pub const NAME: &'static str = "Constant";
}

impl EntityPlugin for ConstantPlugin {
    type Key = ConstantKey;
    type Value = PhysicalConstant;
    type Params = String;
    type SaveParams = ();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_key(&self, name: &String) -> ConstantKey {
        ConstantKey(name.clone())
    }

    fn fetch(&self, name: &String) -> Command {
        Command::fetch("constants.get", json!({ "requested": name }))
    }

    fn decode_fetch(&self, name: &String, result: Value) -> Result<Decoded<Self>, CacheError> {
        let table: ConstantTable =
            serde_json::from_value(result).map_err(|err| decode_error(Self::NAME, err))?;
        let primary = table
            .get(name)
            .cloned()
            .ok_or_else(|| decode_error(Self::NAME, format!("table has no constant {}", name)))?;

        let related = table
            .constants
            .into_iter()
            .filter(|constant| constant.name != *name)
            .map(|constant| DecodedEntry {
                key: ConstantKey(constant.name.clone()),
                params: Some(constant.name.clone()),
                value: constant,
            })
            .collect();

        Ok(Decoded::single(ConstantKey(name.clone()), primary, Some(name.clone()))
            .with_related(related))
    }

    fn keys_to_reload_on(&self, event: &Event, view: &EntryView<'_, Self>) -> Vec<ConstantKey> {
        match event {
            // Any one fetch returns the whole table and refreshes the rest.
            Event::ConstantsChanged => view.keys().min().cloned().into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EntityCache, RecordingListener};
    use easotope_core::CacheConfig;
    use easotope_events::{Completion, MockRemote};
    use std::sync::Arc;

    fn table() -> ConstantTable {
        ConstantTable {
            constants: vec![
                PhysicalConstant::new("R13_VPDB", 0.011180, "ratio"),
                PhysicalConstant::new("R18_VSMOW", 0.0020052, "ratio"),
                PhysicalConstant::new("LAMBDA", 0.528, ""),
            ],
        }
    }

    #[test]
    fn test_one_fetch_seeds_every_constant() {
        let remote = Arc::new(MockRemote::new());
        let cache = EntityCache::new(ConstantPlugin, remote.clone(), CacheConfig::default());
        let fetcher = RecordingListener::<ConstantPlugin>::fetcher();

        let id = cache.get(fetcher.subscriber(), "LAMBDA".to_string()).unwrap();
        cache
            .complete(&Completion::ok(id, serde_json::to_value(table()).unwrap()))
            .unwrap();

        assert_eq!(fetcher.fetched()[0].1.value, 0.528);
        assert_eq!(
            cache.peek(&ConstantKey::new("R13_VPDB")).unwrap().map(|c| c.value),
            Some(0.011180)
        );

        let second = RecordingListener::<ConstantPlugin>::fetcher();
        let id = cache.get(second.subscriber(), "R18_VSMOW".to_string()).unwrap();
        assert!(id.is_none());
        assert_eq!(remote.submitted_count(), 1);
    }

    #[test]
    fn test_missing_constant_is_a_decode_error() {
        let err = ConstantPlugin
            .decode_fetch(&"KAPPA".to_string(), serde_json::to_value(table()).unwrap())
            .err()
            .expect("missing constant");
        assert!(err.to_string().contains("KAPPA"));
    }

    #[test]
    fn test_constants_changed_refetches_table_once() {
        let remote = Arc::new(MockRemote::new());
        let cache = EntityCache::new(ConstantPlugin, remote.clone(), CacheConfig::default());
        let listener = RecordingListener::<ConstantPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        let fetcher = RecordingListener::<ConstantPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), "LAMBDA".to_string()).unwrap();
        cache
            .complete(&Completion::ok(id, serde_json::to_value(table()).unwrap()))
            .unwrap();
        remote.drain();
        listener.clear();

        cache.apply_event(&Event::ConstantsChanged).unwrap();

        let reloads = remote.named("constants.get");
        assert_eq!(reloads.len(), 1);
        // Readers still see the values being reloaded.
        assert!(cache.peek(&ConstantKey::new("LAMBDA")).unwrap().is_some());

        let mut changed = table();
        changed.constants[0].value = 0.0111802;
        cache
            .complete(&Completion::ok(
                reloads[0].id,
                serde_json::to_value(changed).unwrap(),
            ))
            .unwrap();

        assert_eq!(
            cache.peek(&ConstantKey::new("R13_VPDB")).unwrap().map(|c| c.value),
            Some(0.0111802)
        );
        let updated: Vec<_> = listener.updated().into_iter().map(|(_, key, _)| key).collect();
        assert_eq!(updated, vec![ConstantKey::new("R13_VPDB")]);
        assert_eq!(remote.submitted_count(), 1);
    }
}
