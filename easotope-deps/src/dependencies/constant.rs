//! A named physical constant.
//!
//! Constants either come from the server's constant table or are built in.
//! A built-in constant resolves without a fetch and never goes stale. A
//! constant only applies in the unit it was asked for.

use super::unexpected;
use crate::anchor::Anchor;
use crate::plugin::{DependencyPlugin, ResolveContext};
use easotope_cache::CacheKind;
use easotope_core::{DependencyError, EasotopeResult, LabObject, PhysicalConstant};
use easotope_events::CorrelationId;

#[derive(Debug, Clone)]
pub struct ConstantDependency {
    name: String,
    unit: Option<String>,
    builtin: Option<PhysicalConstant>,
    resolved: Option<LabObject>,
}

impl ConstantDependency {
    pub const NAME: &'static str = "Constant";

    /// Look the constant up in the server's table.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: None,
            builtin: None,
            resolved: None,
        }
    }

    /// Only accept the constant in `unit`.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn builtin(constant: PhysicalConstant) -> Self {
        Self {
            name: constant.name.clone(),
            unit: Some(constant.unit.clone()),
            builtin: Some(constant),
            resolved: None,
        }
    }

    pub fn constant_name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    fn applies(&self, constant: &PhysicalConstant) -> bool {
        constant.name == self.name
            && self.unit.as_ref().map_or(true, |unit| constant.unit == *unit)
    }
}

impl DependencyPlugin for ConstantDependency {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn request_object(&mut self, ctx: &ResolveContext<'_>) -> EasotopeResult<CorrelationId> {
        match &self.builtin {
            Some(constant) => {
                self.resolved = Some(LabObject::Constant(constant.clone()));
                Ok(CorrelationId::NONE)
            }
            None => {
                self.resolved = None;
                ctx.get(&ctx.caches().constants, self.name.clone())
            }
        }
    }

    fn received_object(
        &mut self,
        _ctx: &ResolveContext<'_>,
        object: LabObject,
    ) -> EasotopeResult<CorrelationId> {
        match object {
            LabObject::Constant(constant) if self.applies(&constant) => {
                self.resolved = Some(LabObject::Constant(constant));
                Ok(CorrelationId::NONE)
            }
            LabObject::Constant(constant) if constant.name == self.name => {
                Err(DependencyError::Unavailable {
                    plugin: Self::NAME.to_string(),
                    reason: format!(
                        "constant {} is in {:?}, expected {:?}",
                        self.name,
                        constant.unit,
                        self.unit.as_deref().unwrap_or_default()
                    ),
                }
                .into())
            }
            _ => Err(unexpected(Self::NAME, format!("constant {}", self.name))),
        }
    }

    fn verify_current_object(&self, _anchor: &Anchor) -> bool {
        self.resolved
            .as_ref()
            .and_then(LabObject::as_constant)
            .is_some_and(|constant| self.applies(constant))
    }

    fn caches_to_listen_to(&self) -> &'static [CacheKind] {
        if self.builtin.is_some() {
            &[]
        } else {
            &[CacheKind::Constant]
        }
    }

    fn is_no_longer_valid(&self, _anchor: &Anchor, changed: &LabObject) -> bool {
        self.builtin.is_none()
            && changed
                .as_constant()
                .is_some_and(|constant| constant.name == self.name)
    }

    fn resolved(&self) -> Option<&LabObject> {
        self.resolved.as_ref()
    }

    fn reset(&mut self) {
        self.resolved = None;
    }
}
