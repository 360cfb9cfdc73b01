use super::unexpected;
use crate::anchor::Anchor;
use crate::plugin::{DependencyPlugin, ResolveContext};
use easotope_cache::CacheKind;
use easotope_core::{EasotopeResult, LabObject};
use easotope_events::CorrelationId;

/// The reference material measured, when the anchor names one.
/// Satisfied without an object otherwise.
#[derive(Debug, Clone, Default)]
pub struct StandardDependency {
    resolved: Option<LabObject>,
}

impl StandardDependency {
    pub const NAME: &'static str = "Standard";

    pub fn new() -> Self {
        Self::default()
    }
}

impl DependencyPlugin for StandardDependency {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn request_object(&mut self, ctx: &ResolveContext<'_>) -> EasotopeResult<CorrelationId> {
        self.resolved = None;
        match ctx.anchor().standard_id {
            Some(id) => ctx.get(&ctx.caches().standards, id),
            None => Ok(CorrelationId::NONE),
        }
    }

    fn received_object(
        &mut self,
        ctx: &ResolveContext<'_>,
        object: LabObject,
    ) -> EasotopeResult<CorrelationId> {
        match (object, ctx.anchor().standard_id) {
            (LabObject::Standard(standard), Some(id)) if standard.id == id => {
                self.resolved = Some(LabObject::Standard(standard));
                Ok(CorrelationId::NONE)
            }
            (_, id) => Err(unexpected(Self::NAME, format!("standard {:?}", id))),
        }
    }

    fn verify_current_object(&self, anchor: &Anchor) -> bool {
        let held = self
            .resolved
            .as_ref()
            .and_then(LabObject::as_standard)
            .map(|standard| standard.id);
        held == anchor.standard_id
    }

    fn caches_to_listen_to(&self) -> &'static [CacheKind] {
        &[CacheKind::Standard]
    }

    fn is_no_longer_valid(&self, anchor: &Anchor, changed: &LabObject) -> bool {
        let held = self
            .resolved
            .as_ref()
            .and_then(LabObject::entity_id)
            .or(anchor.standard_id);
        changed
            .as_standard()
            .is_some_and(|standard| Some(standard.id) == held)
    }

    fn resolved(&self) -> Option<&LabObject> {
        self.resolved.as_ref()
    }

    fn reset(&mut self) {
        self.resolved = None;
    }
}
