//! Calculation step registry.
//!
//! Steps are stored by a stable string key (the key persisted with a
//! calculation) and built through a registered constructor.

use crate::dependencies::{
    AcidTempDependency, ConstantDependency, RefGasDependency, StandardDependency,
};
use crate::plugin::DependencyPlugin;
use easotope_core::{DependencyError, EasotopeResult, PhysicalConstant};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One calculation step and the dependencies it needs, in order.
pub trait StepController: Send + Sync {
    fn key(&self) -> &str;

    fn dependencies(&self) -> Vec<Box<dyn DependencyPlugin>>;
}

pub type StepFactory = Arc<dyn Fn() -> Box<dyn StepController> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the bulk and clumped CO2 steps.
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register(BulkCo2Step::KEY, || {
            Box::new(BulkCo2Step) as Box<dyn StepController>
        });
        registry.register(ClumpedCo2Step::KEY, || {
            Box::new(ClumpedCo2Step) as Box<dyn StepController>
        });
        registry
    }

    /// Register `factory` under `key`. Returns false if it replaced an
    /// existing registration.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn StepController> + Send + Sync + 'static,
    {
        self.factories
            .insert(key.into(), Arc::new(factory))
            .is_none()
    }

    pub fn create(&self, key: &str) -> EasotopeResult<Box<dyn StepController>> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| DependencyError::UnknownStep {
                key: key.to_string(),
            })?;
        Ok(factory())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

// ============================================================================
// BUILT-IN STEPS
// ============================================================================

const RATIO_CONSTANTS: [&str; 4] = ["R13_VPDB", "R18_VSMOW", "R17_VSMOW", "LAMBDA_17"];

fn bulk_dependencies() -> Vec<Box<dyn DependencyPlugin>> {
    let mut dependencies: Vec<Box<dyn DependencyPlugin>> = vec![
        Box::new(RefGasDependency::new()),
        Box::new(AcidTempDependency::new()),
    ];
    for name in RATIO_CONSTANTS {
        dependencies.push(Box::new(ConstantDependency::named(name).with_unit("ratio")));
    }
    dependencies
}

/// Bulk delta 13C and delta 18O of CO2 against the reference gas.
#[derive(Debug, Clone, Copy)]
pub struct BulkCo2Step;

impl BulkCo2Step {
    pub const KEY: &'static str = "co2.bulk";
}

impl StepController for BulkCo2Step {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn dependencies(&self) -> Vec<Box<dyn DependencyPlugin>> {
        bulk_dependencies()
    }
}

/// Clumped isotope (Delta 47) reduction. Needs everything the bulk step
/// needs plus the measured standard and the Kelvin offset for the acid
/// temperature correction.
#[derive(Debug, Clone, Copy)]
pub struct ClumpedCo2Step;

impl ClumpedCo2Step {
    pub const KEY: &'static str = "co2.clumped";
}

impl StepController for ClumpedCo2Step {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn dependencies(&self) -> Vec<Box<dyn DependencyPlugin>> {
        let mut dependencies = bulk_dependencies();
        dependencies.push(Box::new(StandardDependency::new()));
        dependencies.push(Box::new(ConstantDependency::builtin(PhysicalConstant::new(
            "KELVIN_OFFSET",
            273.15,
            "K",
        ))));
        dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easotope_core::EasotopeError;

    #[test]
    fn test_builtin_steps_registered() {
        let registry = StepRegistry::with_builtin_steps();
        assert_eq!(registry.keys(), vec!["co2.bulk", "co2.clumped"]);
        assert!(registry.contains(BulkCo2Step::KEY));
    }

    #[test]
    fn test_create_builds_step_dependencies() {
        let registry = StepRegistry::with_builtin_steps();

        let bulk = registry.create("co2.bulk").unwrap();
        assert_eq!(bulk.key(), "co2.bulk");
        let names: Vec<_> = bulk.dependencies().iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            vec!["RefGas", "AcidTemp", "Constant", "Constant", "Constant", "Constant"]
        );

        let clumped = registry.create("co2.clumped").unwrap();
        let dependencies = clumped.dependencies();
        assert_eq!(dependencies.len(), 8);
        assert_eq!(dependencies[6].name(), "Standard");
        assert!(dependencies[7].caches_to_listen_to().is_empty());
    }

    #[test]
    fn test_unknown_step_is_an_error() {
        let registry = StepRegistry::with_builtin_steps();
        match registry.create("co2.d48") {
            Err(EasotopeError::Dependency(DependencyError::UnknownStep { key })) => {
                assert_eq!(key, "co2.d48")
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(step) => panic!("unexpected step {}", step.key()),
        }
    }

    #[test]
    fn test_register_reports_replacement() {
        struct Empty;

        impl StepController for Empty {
            fn key(&self) -> &str {
                "empty"
            }

            fn dependencies(&self) -> Vec<Box<dyn DependencyPlugin>> {
                Vec::new()
            }
        }

        let mut registry = StepRegistry::new();
        assert!(registry.register("empty", || Box::new(Empty) as Box<dyn StepController>));
        assert!(!registry.register("empty", || Box::new(Empty) as Box<dyn StepController>));
        assert!(registry.create("empty").unwrap().dependencies().is_empty());
    }
}
