//! Reference gas valid at the anchor date.
//!
//! Resolved in two hops: the reference gas list of the anchor's mass spec,
//! then the gas the list selects for the acquisition date.

use super::unexpected;
use crate::anchor::Anchor;
use crate::plugin::{DependencyPlugin, ResolveContext};
use easotope_cache::CacheKind;
use easotope_core::{DependencyError, EasotopeResult, EntityId, LabObject, RefGasList};
use easotope_events::CorrelationId;

#[derive(Debug, Clone, Default)]
pub struct RefGasDependency {
    list: Option<RefGasList>,
    selected: Option<EntityId>,
    resolved: Option<LabObject>,
}

impl RefGasDependency {
    pub const NAME: &'static str = "RefGas";

    pub fn new() -> Self {
        Self::default()
    }
}

impl DependencyPlugin for RefGasDependency {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn request_object(&mut self, ctx: &ResolveContext<'_>) -> EasotopeResult<CorrelationId> {
        self.reset();
        ctx.get(&ctx.caches().ref_gas_lists, ctx.anchor().mass_spec_id)
    }

    fn received_object(
        &mut self,
        ctx: &ResolveContext<'_>,
        object: LabObject,
    ) -> EasotopeResult<CorrelationId> {
        let anchor = ctx.anchor();
        match object {
            LabObject::RefGasList(list) if list.mass_spec_id == anchor.mass_spec_id => {
                let Some(summary) = list.valid_at(anchor.acquired_at).copied() else {
                    return Err(DependencyError::Unavailable {
                        plugin: Self::NAME.to_string(),
                        reason: format!(
                            "no reference gas on mass spec {} at {}",
                            anchor.mass_spec_id, anchor.acquired_at
                        ),
                    }
                    .into());
                };
                self.selected = Some(summary.id);
                self.list = Some(list);
                ctx.get(&ctx.caches().ref_gases, summary.id)
            }
            // The list still names a gas that has since moved away.
            LabObject::RefGas(gas)
                if self.selected == Some(gas.id) && gas.mass_spec_id != anchor.mass_spec_id =>
            {
                self.reset();
                Err(DependencyError::Unavailable {
                    plugin: Self::NAME.to_string(),
                    reason: format!(
                        "reference gas {} moved from mass spec {} to {}",
                        gas.id, anchor.mass_spec_id, gas.mass_spec_id
                    ),
                }
                .into())
            }
            LabObject::RefGas(gas) if self.selected == Some(gas.id) => {
                self.resolved = Some(LabObject::RefGas(gas));
                Ok(CorrelationId::NONE)
            }
            other => Err(unexpected(
                Self::NAME,
                format!(
                    "reference gas data for mass spec {}, got {}",
                    anchor.mass_spec_id,
                    other.object_type()
                ),
            )),
        }
    }

    fn verify_current_object(&self, anchor: &Anchor) -> bool {
        match (&self.list, &self.resolved) {
            (Some(list), Some(LabObject::RefGas(gas))) => {
                list.mass_spec_id == anchor.mass_spec_id
                    && gas.mass_spec_id == anchor.mass_spec_id
                    && list.is_valid_at(gas.id, anchor.acquired_at)
            }
            _ => false,
        }
    }

    fn caches_to_listen_to(&self) -> &'static [CacheKind] {
        &[CacheKind::RefGasList, CacheKind::RefGas]
    }

    fn is_no_longer_valid(&self, anchor: &Anchor, changed: &LabObject) -> bool {
        match changed {
            // Only a change in which gas covers the anchor date matters.
            LabObject::RefGasList(list) if list.mass_spec_id == anchor.mass_spec_id => {
                list.valid_at(anchor.acquired_at).map(|summary| summary.id) != self.selected
            }
            LabObject::RefGas(gas) => self.selected == Some(gas.id),
            _ => false,
        }
    }

    fn resolved(&self) -> Option<&LabObject> {
        self.resolved.as_ref()
    }

    fn reset(&mut self) {
        self.list = None;
        self.selected = None;
        self.resolved = None;
    }
}
