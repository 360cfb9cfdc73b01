use super::unexpected;
use crate::anchor::Anchor;
use crate::plugin::{DependencyPlugin, ResolveContext};
use easotope_cache::CacheKind;
use easotope_core::{EasotopeResult, LabObject};
use easotope_events::CorrelationId;

/// The acid digestion temperature the sample was prepared at.
#[derive(Debug, Clone, Default)]
pub struct AcidTempDependency {
    resolved: Option<LabObject>,
}

impl AcidTempDependency {
    pub const NAME: &'static str = "AcidTemp";

    pub fn new() -> Self {
        Self::default()
    }
}

impl DependencyPlugin for AcidTempDependency {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn request_object(&mut self, ctx: &ResolveContext<'_>) -> EasotopeResult<CorrelationId> {
        self.resolved = None;
        ctx.get(&ctx.caches().acid_temps, ctx.anchor().acid_temp_id)
    }

    fn received_object(
        &mut self,
        ctx: &ResolveContext<'_>,
        object: LabObject,
    ) -> EasotopeResult<CorrelationId> {
        let id = ctx.anchor().acid_temp_id;
        match object {
            LabObject::AcidTemp(acid_temp) if acid_temp.id == id => {
                self.resolved = Some(LabObject::AcidTemp(acid_temp));
                Ok(CorrelationId::NONE)
            }
            _ => Err(unexpected(Self::NAME, format!("acid temperature {}", id))),
        }
    }

    fn verify_current_object(&self, anchor: &Anchor) -> bool {
        self.resolved
            .as_ref()
            .and_then(LabObject::as_acid_temp)
            .is_some_and(|acid_temp| acid_temp.id == anchor.acid_temp_id)
    }

    fn caches_to_listen_to(&self) -> &'static [CacheKind] {
        &[CacheKind::AcidTemp]
    }

    fn is_no_longer_valid(&self, anchor: &Anchor, changed: &LabObject) -> bool {
        let held = self
            .resolved
            .as_ref()
            .and_then(LabObject::entity_id)
            .unwrap_or(anchor.acid_temp_id);
        changed
            .as_acid_temp()
            .is_some_and(|acid_temp| acid_temp.id == held)
    }

    fn resolved(&self) -> Option<&LabObject> {
        self.resolved.as_ref()
    }

    fn reset(&mut self) {
        self.resolved = None;
    }
}
