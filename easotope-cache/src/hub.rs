//! The per-context cache hub.
//!
//! A [`Cache`] owns one [`EntityCache`] per registered plugin, all sharing
//! one remote channel and one configuration. It is the handle threaded
//! through callers instead of any thread-keyed global.

use crate::cache::{CacheSink, CacheStats, EntityCache, EntityPlugin};
use easotope_core::{new_instance_id, CacheConfig, CacheError, EasotopeResult, InstanceId};
use easotope_events::{Completion, Event, Inbound, InboundReceiver, RemoteChannel};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

pub struct Cache {
    id: InstanceId,
    channel: Arc<dyn RemoteChannel>,
    config: CacheConfig,
    sinks: RwLock<Vec<Arc<dyn CacheSink>>>,
}

impl Cache {
    pub fn new(channel: Arc<dyn RemoteChannel>, config: CacheConfig) -> Self {
        let id = new_instance_id();
        info!(cache_id = %id, "Cache context created");
        Self {
            id,
            channel,
            config,
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn sinks(&self) -> EasotopeResult<Vec<Arc<dyn CacheSink>>> {
        // Snapshot so callbacks run without the registry lock held.
        self.sinks.read().map(|sinks| sinks.clone()).map_err(|_| {
            CacheError::LockPoisoned {
                cache: "hub".to_string(),
            }
            .into()
        })
    }

    /// Create the entity cache for `plugin` and route inbound traffic to it.
    pub fn register<P: EntityPlugin>(&self, plugin: P) -> EasotopeResult<Arc<EntityCache<P>>> {
        let cache = Arc::new(EntityCache::new(
            plugin,
            Arc::clone(&self.channel),
            self.config.clone(),
        ));
        let mut sinks = self.sinks.write().map_err(|_| CacheError::LockPoisoned {
            cache: "hub".to_string(),
        })?;
        sinks.push(Arc::clone(&cache) as Arc<dyn CacheSink>);
        debug!(cache_id = %self.id, plugin = cache.plugin().name(), "Entity cache registered");
        Ok(cache)
    }

    /// Route a completion to the cache that submitted its command.
    /// Returns `Ok(false)` if no cache claims it.
    pub fn complete(&self, completion: &Completion) -> EasotopeResult<bool> {
        for sink in self.sinks()? {
            if sink.complete(completion)? {
                return Ok(true);
            }
        }
        warn!(
            cache_id = %self.id,
            correlation_id = %completion.id,
            "Completion for unknown correlation id dropped"
        );
        Ok(false)
    }

    /// Offer a push event to every registered cache, in registration order.
    pub fn apply_event(&self, event: &Event) -> EasotopeResult<()> {
        debug!(cache_id = %self.id, event = event.event_type(), "Applying event");
        for sink in self.sinks()? {
            sink.apply_event(event)?;
        }
        Ok(())
    }

    pub fn dispatch(&self, inbound: Inbound) -> EasotopeResult<()> {
        match inbound {
            Inbound::Completion(completion) => self.complete(&completion).map(|_| ()),
            Inbound::Event(event) => self.apply_event(&event),
        }
    }

    /// Drain the inbound queue in delivery order until every sender is gone.
    pub async fn run(&self, mut inbound: InboundReceiver) {
        info!(cache_id = %self.id, "Inbound pump started");
        while let Some(item) = inbound.recv().await {
            if let Err(e) = self.dispatch(item) {
                error!(cache_id = %self.id, error = %e, "Failed to apply inbound item");
            }
        }
        info!(cache_id = %self.id, "Inbound pump stopped");
    }

    /// Statistics per registered plugin.
    pub fn stats(&self) -> EasotopeResult<Vec<(&'static str, CacheStats)>> {
        let mut stats = Vec::new();
        for sink in self.sinks()? {
            stats.push((sink.name(), sink.stats()?));
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RecordingListener;
    use crate::plugins::{AcidTempPlugin, StandardPlugin};
    use easotope_core::{AcidTemp, Standard};
    use easotope_events::{inbound_channel, CorrelationId, MockRemote};

    fn standard(id: i32, name: &str) -> Standard {
        Standard {
            id,
            name: name.to_string(),
            description: None,
            enabled: true,
        }
    }

    fn acid_temp(id: i32) -> AcidTemp {
        AcidTemp {
            id,
            sample_type_id: 1,
            temperature: 70.0,
            fractionation_factor: 1.00871,
            description: None,
        }
    }

    #[test]
    fn test_completion_routed_to_owner() {
        let remote = Arc::new(MockRemote::new());
        let hub = Cache::new(remote.clone(), CacheConfig::default());
        let standards = hub.register(StandardPlugin).unwrap();
        let acid_temps = hub.register(AcidTempPlugin).unwrap();

        let fetcher = RecordingListener::<AcidTempPlugin>::fetcher();
        let id = acid_temps.get(fetcher.subscriber(), 2).unwrap();

        let handled = hub
            .complete(&Completion::ok(id, serde_json::to_value(acid_temp(2)).unwrap()))
            .unwrap();

        assert!(handled);
        assert_eq!(fetcher.fetched(), vec![(id, acid_temp(2))]);
        assert_eq!(standards.stats().unwrap().misses, 0);
    }

    #[test]
    fn test_unknown_completion_is_dropped() {
        let hub = Cache::new(Arc::new(MockRemote::new()), CacheConfig::default());
        hub.register(StandardPlugin).unwrap();

        let handled = hub
            .complete(&Completion::ok(CorrelationId::next(), serde_json::json!({})))
            .unwrap();
        assert!(!handled);
    }

    #[test]
    fn test_event_fans_out() {
        let remote = Arc::new(MockRemote::new());
        let hub = Cache::new(remote.clone(), CacheConfig::default());
        let standards = hub.register(StandardPlugin).unwrap();
        let listener = RecordingListener::<StandardPlugin>::listener();
        standards.add_listener(listener.subscriber()).unwrap();

        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        let id = standards.get(fetcher.subscriber(), 7).unwrap();
        let result = serde_json::to_value(standard(7, "NBS19")).unwrap();
        hub.complete(&Completion::ok(id, result)).unwrap();

        hub.apply_event(&Event::StandardUpdated {
            standard: standard(7, "NBS19b"),
        })
        .unwrap();

        assert_eq!(listener.updated().len(), 1);
        let stats = hub.stats().unwrap();
        assert_eq!(stats[0].0, "Standard");
        assert_eq!(stats[0].1.events_applied, 1);
    }

    #[tokio::test]
    async fn test_run_applies_inbound_in_order() {
        let remote = Arc::new(MockRemote::new());
        let hub = Cache::new(remote.clone(), CacheConfig::default());
        let standards = hub.register(StandardPlugin).unwrap();
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        let id = standards.get(fetcher.subscriber(), 7).unwrap();

        let (tx, rx) = inbound_channel();
        tx.send(Completion::ok(id, serde_json::to_value(standard(7, "NBS19")).unwrap()).into())
            .unwrap();
        tx.send(
            Event::StandardUpdated {
                standard: standard(7, "NBS19b"),
            }
            .into(),
        )
        .unwrap();
        drop(tx);

        hub.run(rx).await;

        assert_eq!(fetcher.fetched()[0].1.name, "NBS19");
        let cached = standards
            .peek(&crate::plugins::StandardKey(7))
            .unwrap()
            .unwrap();
        assert_eq!(cached.name, "NBS19b");
    }
}
