//! Typed bundle of the lab entity caches.
//!
//! [`LabCaches`] registers every lab plugin on one [`Cache`] hub and lets
//! consumers that do not care about concrete value types (the dependency
//! engine) listen to any of them through [`LabObject`]s.

use crate::cache::{CacheListener, Capabilities, EntityCache, EntityPlugin, Subscriber};
use crate::hub::Cache;
use crate::plugins::{
    AcidTempPlugin, ConstantPlugin, MassSpecPlugin, RefGasListPlugin, RefGasPlugin,
    StandardPlugin,
};
use easotope_core::{CacheConfig, EasotopeResult, LabObject};
use easotope_events::{CorrelationId, RemoteChannel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Which entity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKind {
    MassSpec,
    Standard,
    RefGas,
    RefGasList,
    AcidTemp,
    Constant,
}

impl CacheKind {
    pub const ALL: [CacheKind; 6] = [
        CacheKind::MassSpec,
        CacheKind::Standard,
        CacheKind::RefGas,
        CacheKind::RefGasList,
        CacheKind::AcidTemp,
        CacheKind::Constant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::MassSpec => "MassSpec",
            CacheKind::Standard => "Standard",
            CacheKind::RefGas => "RefGas",
            CacheKind::RefGasList => "RefGasList",
            CacheKind::AcidTemp => "AcidTemp",
            CacheKind::Constant => "Constant",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value-type agnostic change listener.
pub trait ChangeListener: Send + Sync {
    fn is_alive(&self) -> bool {
        true
    }

    /// `object` is the new value, or the last known value of an entity
    /// that was deleted or dropped from the cache. Deletions of entities
    /// never cached are not reported.
    fn on_changed(&self, kind: CacheKind, object: LabObject);
}

/// Adapts a [`ChangeListener`] to one entity cache.
struct ChangeAdapter {
    kind: CacheKind,
    inner: Arc<dyn ChangeListener>,
}

impl<P> CacheListener<P> for ChangeAdapter
where
    P: EntityPlugin,
    P::Value: Into<LabObject>,
{
    fn capabilities(&self) -> Capabilities {
        Capabilities::LISTENER
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    fn on_updated(&self, _id: CorrelationId, _key: &P::Key, value: &P::Value) {
        self.inner.on_changed(self.kind, value.clone().into());
    }

    fn on_deleted(&self, _id: CorrelationId, _key: &P::Key, old: Option<&P::Value>) {
        if let Some(old) = old {
            self.inner.on_changed(self.kind, old.clone().into());
        }
    }

    fn on_invalidated(&self, _id: CorrelationId, _key: &P::Key, old: &P::Value) {
        self.inner.on_changed(self.kind, old.clone().into());
    }
}

/// Detaches a change listener when dropped.
pub struct ChangeSubscription {
    kind: CacheKind,
    detach: Option<Box<dyn FnOnce() -> EasotopeResult<bool> + Send + Sync>>,
}

impl ChangeSubscription {
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Detach now. Returns whether the listener was still registered.
    pub fn cancel(mut self) -> EasotopeResult<bool> {
        match self.detach.take() {
            Some(detach) => detach(),
            None => Ok(false),
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            if let Err(e) = detach() {
                warn!(kind = %self.kind, error = %e, "Failed to detach change listener");
            }
        }
    }
}

impl fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("kind", &self.kind)
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

fn attach<P>(
    cache: &Arc<EntityCache<P>>,
    kind: CacheKind,
    listener: Arc<dyn ChangeListener>,
) -> EasotopeResult<ChangeSubscription>
where
    P: EntityPlugin,
    P::Value: Into<LabObject>,
{
    let subscriber: Subscriber<P> = Arc::new(ChangeAdapter {
        kind,
        inner: listener,
    });
    cache.add_listener(Arc::clone(&subscriber))?;
    let cache = Arc::clone(cache);
    Ok(ChangeSubscription {
        kind,
        detach: Some(Box::new(move || cache.remove_listener(&subscriber))),
    })
}

/// One entity cache per lab plugin over a shared hub.
#[derive(Clone)]
pub struct LabCaches {
    pub hub: Arc<Cache>,
    pub mass_specs: Arc<EntityCache<MassSpecPlugin>>,
    pub standards: Arc<EntityCache<StandardPlugin>>,
    pub ref_gases: Arc<EntityCache<RefGasPlugin>>,
    pub ref_gas_lists: Arc<EntityCache<RefGasListPlugin>>,
    pub acid_temps: Arc<EntityCache<AcidTempPlugin>>,
    pub constants: Arc<EntityCache<ConstantPlugin>>,
}

impl LabCaches {
    pub fn new(channel: Arc<dyn RemoteChannel>, config: CacheConfig) -> EasotopeResult<Self> {
        let hub = Arc::new(Cache::new(channel, config));
        Ok(Self {
            mass_specs: hub.register(MassSpecPlugin)?,
            standards: hub.register(StandardPlugin)?,
            ref_gases: hub.register(RefGasPlugin)?,
            ref_gas_lists: hub.register(RefGasListPlugin)?,
            acid_temps: hub.register(AcidTempPlugin)?,
            constants: hub.register(ConstantPlugin)?,
            hub,
        })
    }

    /// Report every update and deletion in the `kind` cache to `listener`
    /// until the returned subscription is dropped.
    pub fn listen(
        &self,
        kind: CacheKind,
        listener: Arc<dyn ChangeListener>,
    ) -> EasotopeResult<ChangeSubscription> {
        match kind {
            CacheKind::MassSpec => attach(&self.mass_specs, kind, listener),
            CacheKind::Standard => attach(&self.standards, kind, listener),
            CacheKind::RefGas => attach(&self.ref_gases, kind, listener),
            CacheKind::RefGasList => attach(&self.ref_gas_lists, kind, listener),
            CacheKind::AcidTemp => attach(&self.acid_temps, kind, listener),
            CacheKind::Constant => attach(&self.constants, kind, listener),
        }
    }
}

impl fmt::Debug for LabCaches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabCaches")
            .field("hub", &self.hub.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RecordingListener;
    use easotope_core::Standard;
    use easotope_events::{Completion, Event, MockRemote};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector {
        seen: Mutex<Vec<(CacheKind, LabObject)>>,
    }

    impl ChangeListener for Collector {
        fn on_changed(&self, kind: CacheKind, object: LabObject) {
            self.seen.lock().unwrap().push((kind, object));
        }
    }

    fn standard(name: &str) -> Standard {
        Standard {
            id: 7,
            name: name.to_string(),
            description: None,
            enabled: true,
        }
    }

    fn cached_standard(caches: &LabCaches) {
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        let id = caches.standards.get(fetcher.subscriber(), 7).unwrap();
        caches
            .hub
            .complete(&Completion::ok(id, serde_json::to_value(standard("NBS19")).unwrap()))
            .unwrap();
    }

    #[test]
    fn test_listen_reports_lab_objects() {
        let caches = LabCaches::new(Arc::new(MockRemote::new()), CacheConfig::default()).unwrap();
        cached_standard(&caches);
        let collector = Arc::new(Collector::default());
        let _subscription = caches
            .listen(CacheKind::Standard, collector.clone())
            .unwrap();

        caches
            .hub
            .apply_event(&Event::StandardUpdated {
                standard: standard("NBS19b"),
            })
            .unwrap();
        caches
            .hub
            .apply_event(&Event::StandardDeleted { id: 7 })
            .unwrap();

        let seen = collector.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, CacheKind::Standard);
        assert_eq!(seen[0].1, LabObject::Standard(standard("NBS19b")));
        assert_eq!(seen[1].1.entity_id(), Some(7));
    }

    #[test]
    fn test_evicted_entry_reported_as_change() {
        let config = CacheConfig::default().with_reload_on_event(false);
        let caches = LabCaches::new(Arc::new(MockRemote::new()), config).unwrap();
        let list = easotope_core::RefGasList::empty(4);
        let fetcher = RecordingListener::<RefGasListPlugin>::fetcher();
        let id = caches.ref_gas_lists.get(fetcher.subscriber(), 4).unwrap();
        caches
            .hub
            .complete(&Completion::ok(id, serde_json::to_value(&list).unwrap()))
            .unwrap();
        let collector = Arc::new(Collector::default());
        let _subscription = caches
            .listen(CacheKind::RefGasList, collector.clone())
            .unwrap();

        caches
            .hub
            .apply_event(&Event::RefGasDeleted {
                id: 10,
                mass_spec_id: 4,
            })
            .unwrap();

        let seen = collector.seen.lock().unwrap();
        assert_eq!(*seen, vec![(CacheKind::RefGasList, LabObject::RefGasList(list))]);
    }

    #[test]
    fn test_dropping_subscription_detaches() {
        let caches = LabCaches::new(Arc::new(MockRemote::new()), CacheConfig::default()).unwrap();
        let collector = Arc::new(Collector::default());
        let subscription = caches.listen(CacheKind::Standard, collector.clone()).unwrap();
        assert_eq!(caches.standards.listener_count().unwrap(), 1);

        drop(subscription);
        assert_eq!(caches.standards.listener_count().unwrap(), 0);

        let subscription = caches.listen(CacheKind::RefGas, collector).unwrap();
        assert!(subscription.cancel().unwrap());
        assert_eq!(caches.ref_gases.listener_count().unwrap(), 0);
    }

    #[test]
    fn test_cache_kind_names() {
        assert_eq!(CacheKind::ALL.len(), 6);
        assert_eq!(CacheKind::RefGasList.to_string(), "RefGasList");
    }
}
