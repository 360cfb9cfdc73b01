//! Drives the dependency plugins of one calculation step.

use crate::anchor::Anchor;
use crate::plugin::{ChangeInbox, DependencyPlugin, Inbox, Message, ResolveContext};
use crate::registry::StepRegistry;
use easotope_cache::{CacheKind, ChangeListener, ChangeSubscription, LabCaches};
use easotope_core::{CacheError, DependencyError, EasotopeError, EasotopeResult, LabObject};
use easotope_events::{CorrelationId, RemoteError};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Outcome of one [`DependencyManager::resolve`] pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every dependency is resolved; the step can run.
    Ready,
    /// Call `resolve` again once these commands have completed.
    Waiting(Vec<CorrelationId>),
    /// A dependency that was resolved before has changed. Anything computed
    /// from earlier results is out of date. Resolution has already been
    /// restarted for the affected dependencies.
    Stale,
}

impl Resolution {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready)
    }
}

enum SlotState {
    Unresolved,
    /// NONE when the answer is already queued.
    Waiting(CorrelationId),
    Resolved,
    Failed(EasotopeError),
}

struct Slot {
    plugin: Box<dyn DependencyPlugin>,
    state: SlotState,
    /// Bumped on every reset so answers to abandoned requests are dropped.
    generation: u64,
}

impl Slot {
    fn reset(&mut self) {
        self.plugin.reset();
        self.generation += 1;
        self.state = SlotState::Unresolved;
    }

    fn is_active(&self) -> bool {
        matches!(self.state, SlotState::Waiting(_) | SlotState::Resolved)
    }

    fn invalidated_by(&self, anchor: &Anchor, kind: CacheKind, object: &LabObject) -> bool {
        self.is_active()
            && self.plugin.caches_to_listen_to().contains(&kind)
            && self.plugin.is_no_longer_valid(anchor, object)
    }
}

fn next_state(ctx: &ResolveContext<'_>, result: EasotopeResult<CorrelationId>) -> SlotState {
    match result {
        Ok(id) if id.is_some() => SlotState::Waiting(id),
        Ok(_) if ctx.issued() => SlotState::Waiting(CorrelationId::NONE),
        Ok(_) => SlotState::Resolved,
        Err(e) => SlotState::Failed(e),
    }
}

/// Resolves a fixed, ordered list of dependencies for one anchor.
///
/// The manager listens to every cache its plugins declare and re-resolves
/// a dependency as soon as a reported change invalidates it. Dropping the
/// manager detaches those listeners and abandons outstanding requests.
pub struct DependencyManager {
    step: String,
    anchor: Anchor,
    caches: LabCaches,
    slots: Vec<Slot>,
    inbox: Inbox,
    stale: bool,
    _subscriptions: Vec<ChangeSubscription>,
}

impl DependencyManager {
    pub fn new(
        step: impl Into<String>,
        anchor: Anchor,
        caches: LabCaches,
        plugins: Vec<Box<dyn DependencyPlugin>>,
    ) -> EasotopeResult<Self> {
        let step = step.into();
        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));

        let mut kinds: Vec<CacheKind> = Vec::new();
        for plugin in &plugins {
            for kind in plugin.caches_to_listen_to() {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
        }
        let listener: Arc<dyn ChangeListener> = Arc::new(ChangeInbox::new(&inbox));
        let subscriptions = kinds
            .iter()
            .map(|kind| caches.listen(*kind, Arc::clone(&listener)))
            .collect::<EasotopeResult<Vec<_>>>()?;

        debug!(
            step = %step,
            dependencies = plugins.len(),
            caches = ?kinds,
            "Dependency manager created"
        );
        Ok(Self {
            step,
            anchor,
            caches,
            slots: plugins
                .into_iter()
                .map(|plugin| Slot {
                    plugin,
                    state: SlotState::Unresolved,
                    generation: 0,
                })
                .collect(),
            inbox,
            stale: false,
            _subscriptions: subscriptions,
        })
    }

    /// Build the manager for the step registered under `key`.
    pub fn for_step(
        key: &str,
        anchor: Anchor,
        caches: LabCaches,
        registry: &StepRegistry,
    ) -> EasotopeResult<Self> {
        let controller = registry.create(key)?;
        Self::new(controller.key(), anchor, caches, controller.dependencies())
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    /// Move to another anchor. Resolved dependencies that still apply are
    /// kept; the rest are re-resolved on the next [`resolve`](Self::resolve).
    pub fn set_anchor(&mut self, anchor: Anchor) {
        self.anchor = anchor;
        for slot in &mut self.slots {
            if matches!(slot.state, SlotState::Waiting(_)) {
                slot.reset();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn dependency_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.plugin.name()).collect()
    }

    fn queue(&self) -> EasotopeResult<MutexGuard<'_, VecDeque<Message>>> {
        self.inbox.lock().map_err(|_| {
            CacheError::LockPoisoned {
                cache: format!("dependencies of {}", self.step),
            }
            .into()
        })
    }

    // ========================================================================
    // RESOLUTION
    // ========================================================================

    /// Advance every dependency as far as the answers received so far allow.
    ///
    /// A dependency whose fetch failed is reported as an error once and
    /// retried by the next call.
    pub fn resolve(&mut self) -> EasotopeResult<Resolution> {
        for slot in &mut self.slots {
            let reset = match &slot.state {
                SlotState::Failed(_) => true,
                SlotState::Resolved => !slot.plugin.verify_current_object(&self.anchor),
                _ => false,
            };
            if reset {
                debug!(
                    step = %self.step,
                    dependency = slot.plugin.name(),
                    "Re-resolving dependency"
                );
                slot.reset();
            }
        }

        loop {
            let mut progressed = self.drain()?;
            for index in 0..self.slots.len() {
                if matches!(self.slots[index].state, SlotState::Unresolved) {
                    self.request(index);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        let mut waiting = Vec::new();
        let mut failure = None;
        for slot in &self.slots {
            match &slot.state {
                SlotState::Waiting(id) if id.is_some() && !waiting.contains(id) => {
                    waiting.push(*id)
                }
                SlotState::Failed(e) if failure.is_none() => failure = Some(e.clone()),
                _ => {}
            }
        }

        if std::mem::take(&mut self.stale) {
            info!(step = %self.step, "Dependencies changed since last resolution");
            return Ok(Resolution::Stale);
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if waiting.is_empty() {
            debug!(step = %self.step, "Dependencies ready");
            Ok(Resolution::Ready)
        } else {
            debug!(step = %self.step, waiting = waiting.len(), "Waiting on dependencies");
            Ok(Resolution::Waiting(waiting))
        }
    }

    fn request(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        let ctx = ResolveContext::new(
            &self.anchor,
            &self.caches,
            &self.inbox,
            index,
            slot.generation,
        );
        let result = slot.plugin.request_object(&ctx);
        slot.state = next_state(&ctx, result);
        debug!(
            step = %self.step,
            dependency = slot.plugin.name(),
            generation = slot.generation,
            "Dependency requested"
        );
    }

    /// Apply every queued answer and change. Returns whether anything was
    /// queued.
    fn drain(&mut self) -> EasotopeResult<bool> {
        let messages: Vec<Message> = self.queue()?.drain(..).collect();
        let progressed = !messages.is_empty();
        for message in messages {
            match message {
                Message::Fetched {
                    slot,
                    generation,
                    result,
                } => self.receive(slot, generation, result),
                Message::Changed { kind, object } => self.invalidate(kind, &object),
            }
        }
        Ok(progressed)
    }

    fn receive(&mut self, index: usize, generation: u64, result: Result<LabObject, RemoteError>) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.generation != generation || !matches!(slot.state, SlotState::Waiting(_)) {
            debug!(
                step = %self.step,
                dependency = slot.plugin.name(),
                generation,
                "Discarded answer to abandoned request"
            );
            return;
        }
        match result {
            Ok(object) => {
                let ctx =
                    ResolveContext::new(&self.anchor, &self.caches, &self.inbox, index, generation);
                let result = slot.plugin.received_object(&ctx, object);
                slot.state = next_state(&ctx, result);
            }
            Err(error) => {
                warn!(
                    step = %self.step,
                    dependency = slot.plugin.name(),
                    error = %error,
                    "Dependency fetch failed"
                );
                slot.state = SlotState::Failed(
                    DependencyError::FetchFailed {
                        plugin: slot.plugin.name().to_string(),
                        reason: error.to_string(),
                    }
                    .into(),
                );
            }
        }
    }

    fn invalidate(&mut self, kind: CacheKind, object: &LabObject) {
        for slot in &mut self.slots {
            if slot.invalidated_by(&self.anchor, kind, object) {
                info!(
                    step = %self.step,
                    dependency = slot.plugin.name(),
                    changed = object.object_type(),
                    "Dependency invalidated"
                );
                slot.reset();
                self.stale = true;
            }
        }
    }

    /// Whether a change has invalidated a dependency since the last
    /// [`resolve`](Self::resolve). Does not resolve anything.
    pub fn is_stale(&self) -> EasotopeResult<bool> {
        if self.stale {
            return Ok(true);
        }
        let queue = self.queue()?;
        Ok(queue.iter().any(|message| match message {
            Message::Changed { kind, object } => self
                .slots
                .iter()
                .any(|slot| slot.invalidated_by(&self.anchor, *kind, object)),
            Message::Fetched { .. } => false,
        }))
    }

    /// The object dependency `index` resolved to. `None` while unresolved
    /// and for dependencies satisfied without an object.
    pub fn get_resolved(&self, index: usize) -> EasotopeResult<Option<&LabObject>> {
        let slot = self
            .slots
            .get(index)
            .ok_or(DependencyError::IndexOutOfRange { index })?;
        Ok(match slot.state {
            SlotState::Resolved => slot.plugin.resolved(),
            _ => None,
        })
    }
}

impl fmt::Debug for DependencyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyManager")
            .field("step", &self.step)
            .field("anchor", &self.anchor)
            .field("dependencies", &self.dependency_names())
            .field("stale", &self.stale)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::{
        AcidTempDependency, ConstantDependency, RefGasDependency, StandardDependency,
    };
    use easotope_cache::plugins::{RefGasListKey, StandardPlugin};
    use easotope_core::PhysicalConstant;
    use easotope_test_utils::{assertions, fixtures, Event, RecordingListener, TestLab};

    fn anchor() -> Anchor {
        Anchor::new(4, 2, fixtures::day(3, 15))
    }

    fn build(
        lab: &TestLab,
        anchor: Anchor,
        plugins: Vec<Box<dyn DependencyPlugin>>,
    ) -> DependencyManager {
        DependencyManager::new("test", anchor, lab.caches.clone(), plugins).unwrap()
    }

    /// Serve and resolve until the manager stops waiting.
    fn settle(manager: &mut DependencyManager, lab: &TestLab) -> Resolution {
        for _ in 0..10 {
            match manager.resolve().unwrap() {
                Resolution::Waiting(_) => {
                    lab.serve();
                }
                other => return other,
            }
        }
        panic!("dependencies never settled");
    }

    fn resolved_gas(manager: &DependencyManager) -> i32 {
        manager
            .get_resolved(0)
            .unwrap()
            .and_then(LabObject::as_ref_gas)
            .map(|gas| gas.id)
            .unwrap()
    }

    #[test]
    fn test_bulk_step_resolves_in_hops() {
        let lab = fixtures::test_lab();
        let registry = StepRegistry::with_builtin_steps();
        let mut manager =
            DependencyManager::for_step("co2.bulk", anchor(), lab.caches.clone(), &registry)
                .unwrap();
        assert_eq!(manager.step(), "co2.bulk");

        match manager.resolve().unwrap() {
            Resolution::Waiting(ids) => assert_eq!(ids.len(), 6),
            other => panic!("unexpected {:?}", other),
        }
        lab.serve();

        // The list is in; the gas it selects is the second hop.
        match manager.resolve().unwrap() {
            Resolution::Waiting(ids) => assert_eq!(ids.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assertions::assert_submitted(&lab.remote, "ref_gas.get", 1);
        lab.serve();

        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        assert_eq!(resolved_gas(&manager), 11);
        assert_eq!(
            manager.get_resolved(1).unwrap(),
            Some(&LabObject::AcidTemp(fixtures::acid_temp(2, 70.0)))
        );
        let r13 = manager.get_resolved(2).unwrap().and_then(LabObject::as_constant);
        assert_eq!(r13.map(|c| c.name.as_str()), Some("R13_VPDB"));
    }

    #[test]
    fn test_second_manager_resolves_from_cache() {
        let lab = fixtures::test_lab();
        let registry = StepRegistry::with_builtin_steps();
        let mut first =
            DependencyManager::for_step("co2.bulk", anchor(), lab.caches.clone(), &registry)
                .unwrap();
        assert_eq!(settle(&mut first, &lab), Resolution::Ready);

        let mut second =
            DependencyManager::for_step("co2.bulk", anchor(), lab.caches.clone(), &registry)
                .unwrap();
        assert_eq!(second.resolve().unwrap(), Resolution::Ready);
        assert_eq!(lab.pending_commands(), 0);
        assert_eq!(resolved_gas(&second), 11);
    }

    #[test]
    fn test_clumped_step_includes_standard_and_builtin() {
        let lab = fixtures::test_lab();
        let registry = StepRegistry::with_builtin_steps();
        let mut manager = DependencyManager::for_step(
            "co2.clumped",
            anchor().with_standard(7),
            lab.caches.clone(),
            &registry,
        )
        .unwrap();

        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);
        assert_eq!(
            manager.get_resolved(6).unwrap(),
            Some(&LabObject::Standard(fixtures::standard(7, "NBS19")))
        );
        assert_eq!(
            manager.get_resolved(7).unwrap(),
            Some(&LabObject::Constant(PhysicalConstant::new(
                "KELVIN_OFFSET",
                273.15,
                "K"
            )))
        );
    }

    #[test]
    fn test_unknown_step() {
        let lab = fixtures::test_lab();
        let result = DependencyManager::for_step(
            "co2.d48",
            anchor(),
            lab.caches.clone(),
            &StepRegistry::with_builtin_steps(),
        );
        assertions::assert_dependency_error(&result);
    }

    #[test]
    fn test_get_resolved_bounds() {
        let lab = fixtures::test_lab();
        let manager = build(&lab, anchor(), vec![Box::new(AcidTempDependency::new())]);
        assert_eq!(manager.get_resolved(0).unwrap(), None);
        match manager.get_resolved(1) {
            Err(EasotopeError::Dependency(DependencyError::IndexOutOfRange { index })) => {
                assert_eq!(index, 1)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_satisfied_without_object() {
        let lab = fixtures::test_lab();
        let mut manager = build(&lab, anchor(), vec![Box::new(StandardDependency::new())]);
        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        assert_eq!(manager.get_resolved(0).unwrap(), None);
        assert_eq!(lab.pending_commands(), 0);
    }

    // === re-resolution ===

    #[test]
    fn test_update_invalidates_resolved_standard() {
        let lab = fixtures::test_lab();
        let mut manager = build(
            &lab,
            anchor().with_standard(7),
            vec![Box::new(StandardDependency::new())],
        );
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);

        lab.push(Event::StandardUpdated {
            standard: fixtures::standard(7, "NBS19b"),
        });
        assert!(manager.is_stale().unwrap());

        assert_eq!(manager.resolve().unwrap(), Resolution::Stale);
        assert_eq!(
            manager.get_resolved(0).unwrap(),
            Some(&LabObject::Standard(fixtures::standard(7, "NBS19b")))
        );
        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        assert!(!manager.is_stale().unwrap());
    }

    #[test]
    fn test_unrelated_update_keeps_resolution() {
        let lab = fixtures::test_lab();
        lab.server().standards.insert(8, fixtures::standard(8, "NBS18"));
        let mut manager = build(
            &lab,
            anchor().with_standard(7),
            vec![Box::new(StandardDependency::new())],
        );
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        lab.caches.standards.get(fetcher.subscriber(), 8).unwrap();
        lab.serve();

        lab.push(Event::StandardUpdated {
            standard: fixtures::standard(8, "NBS18b"),
        });

        assert!(!manager.is_stale().unwrap());
        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        assert_eq!(
            manager.get_resolved(0).unwrap(),
            Some(&LabObject::Standard(fixtures::standard(7, "NBS19")))
        );
    }

    #[test]
    fn test_deletion_refetches() {
        let lab = fixtures::test_lab();
        let mut manager = build(
            &lab,
            anchor().with_standard(7),
            vec![Box::new(StandardDependency::new())],
        );
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);

        lab.push(Event::StandardDeleted { id: 7 });

        assert_eq!(manager.resolve().unwrap(), Resolution::Stale);
        assertions::assert_submitted(&lab.remote, "standard.get", 1);
        assert!(matches!(manager.resolve().unwrap(), Resolution::Waiting(_)));
    }

    #[test]
    fn test_new_ref_gas_covering_anchor_invalidates() {
        let lab = fixtures::test_lab();
        let mut manager = build(&lab, anchor(), vec![Box::new(RefGasDependency::new())]);
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);
        assert_eq!(resolved_gas(&manager), 11);

        let gas = fixtures::ref_gas(12, 4, fixtures::day(3, 12));
        lab.server().ref_gases.insert(12, gas.clone());
        lab.push(Event::RefGasUpdated { ref_gas: gas });

        // Nothing changes until the reloaded list arrives.
        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        lab.serve();

        assert_eq!(manager.resolve().unwrap(), Resolution::Stale);
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);
        assert_eq!(resolved_gas(&manager), 12);
    }

    #[test]
    fn test_ref_gas_moved_to_another_mass_spec_is_replaced() {
        let lab = fixtures::test_lab();
        let mut manager = build(&lab, anchor(), vec![Box::new(RefGasDependency::new())]);
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);
        assert_eq!(resolved_gas(&manager), 11);

        let moved = fixtures::ref_gas(11, 5, fixtures::day(3, 10));
        lab.server().ref_gases.insert(11, moved.clone());
        lab.push(Event::RefGasUpdated { ref_gas: moved });
        lab.serve();

        let list = lab.caches.ref_gas_lists.peek(&RefGasListKey(4)).unwrap();
        let ids: Vec<_> = list.into_iter().flat_map(|l| l.ref_gases).map(|s| s.id).collect();
        assert_eq!(ids, vec![10]);

        assert_eq!(manager.resolve().unwrap(), Resolution::Stale);
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);
        let gas = manager.get_resolved(0).unwrap().and_then(LabObject::as_ref_gas).cloned();
        assert_eq!(gas.map(|gas| (gas.id, gas.mass_spec_id)), Some((10, 4)));
    }

    #[test]
    fn test_later_ref_gas_does_not_invalidate() {
        let lab = fixtures::test_lab();
        let mut manager = build(&lab, anchor(), vec![Box::new(RefGasDependency::new())]);
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);

        let gas = fixtures::ref_gas(13, 4, fixtures::day(4, 1));
        lab.server().ref_gases.insert(13, gas.clone());
        lab.push(Event::RefGasUpdated { ref_gas: gas });
        lab.serve();

        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        assert_eq!(resolved_gas(&manager), 11);
    }

    #[test]
    fn test_constant_change_invalidates_named_only() {
        let lab = fixtures::test_lab();
        let mut manager = build(
            &lab,
            anchor(),
            vec![
                Box::new(ConstantDependency::named("R13_VPDB")),
                Box::new(ConstantDependency::named("R18_VSMOW")),
            ],
        );
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);

        *lab.server() = fixtures::lab_server()
            .with_constant(PhysicalConstant::new("R13_VPDB", 0.0111802, "ratio"));
        lab.push(Event::ConstantsChanged);
        lab.serve();

        assert_eq!(manager.resolve().unwrap(), Resolution::Stale);
        let r13 = manager.get_resolved(0).unwrap().and_then(LabObject::as_constant);
        assert_eq!(r13.map(|c| c.value), Some(0.0111802));
        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
    }

    // === failures and anchors ===

    #[test]
    fn test_fetch_failure_reported_then_retried() {
        let lab = fixtures::test_lab();
        let mut manager = build(
            &lab,
            Anchor::new(4, 99, fixtures::day(3, 15)),
            vec![Box::new(AcidTempDependency::new())],
        );
        assert!(matches!(manager.resolve().unwrap(), Resolution::Waiting(_)));
        lab.serve();

        match manager.resolve() {
            Err(EasotopeError::Dependency(DependencyError::FetchFailed { plugin, .. })) => {
                assert_eq!(plugin, "AcidTemp")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(manager.resolve().unwrap(), Resolution::Waiting(_)));
        assertions::assert_submitted(&lab.remote, "acid_temp.get", 1);
    }

    #[test]
    fn test_no_ref_gas_before_anchor_date() {
        let lab = fixtures::test_lab();
        let mut manager = build(
            &lab,
            Anchor::new(4, 2, fixtures::day(2, 1)),
            vec![Box::new(RefGasDependency::new())],
        );
        manager.resolve().unwrap();
        lab.serve();

        match manager.resolve() {
            Err(EasotopeError::Dependency(DependencyError::Unavailable { plugin, .. })) => {
                assert_eq!(plugin, "RefGas")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_anchor_reuses_applicable_objects() {
        let lab = fixtures::test_lab();
        let mut manager = build(&lab, anchor(), vec![Box::new(RefGasDependency::new())]);
        assert_eq!(settle(&mut manager, &lab), Resolution::Ready);

        manager.set_anchor(anchor().with_acquired_at(fixtures::day(3, 20)));
        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        assert_eq!(lab.pending_commands(), 0);

        manager.set_anchor(anchor().with_acquired_at(fixtures::day(3, 5)));
        assert!(matches!(manager.resolve().unwrap(), Resolution::Waiting(_)));
        lab.serve();
        assert_eq!(manager.resolve().unwrap(), Resolution::Ready);
        assert_eq!(resolved_gas(&manager), 10);
    }

    #[test]
    fn test_drop_detaches_listeners() {
        let lab = fixtures::test_lab();
        let manager = build(
            &lab,
            anchor(),
            vec![
                Box::new(StandardDependency::new()),
                Box::new(RefGasDependency::new()),
            ],
        );
        assert_eq!(lab.caches.standards.listener_count().unwrap(), 1);
        assert_eq!(lab.caches.ref_gas_lists.listener_count().unwrap(), 1);

        drop(manager);
        assert_eq!(lab.caches.standards.listener_count().unwrap(), 0);
        assert_eq!(lab.caches.ref_gas_lists.listener_count().unwrap(), 0);
    }

    #[test]
    fn test_answer_for_abandoned_request_is_ignored() {
        let lab = fixtures::test_lab();
        let mut manager = build(&lab, anchor(), vec![Box::new(RefGasDependency::new())]);
        assert!(matches!(manager.resolve().unwrap(), Resolution::Waiting(_)));

        // Moving the anchor abandons the outstanding list fetch.
        let old = manager.slots[0].generation;
        manager.set_anchor(Anchor::new(5, 2, fixtures::day(3, 15)));
        lab.serve();

        assert!(matches!(manager.resolve().unwrap(), Resolution::Waiting(_)));
        assert!(manager.slots[0].generation > old);
        assert_eq!(manager.get_resolved(0).unwrap(), None);
    }
}
