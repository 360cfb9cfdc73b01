//! Easotope Deps - Calculation Dependency Resolution
//!
//! A calculation step needs a handful of external facts before it can run:
//! the reference gas valid when the sample was measured, the acid
//! temperature, physical constants. Each fact is a [`DependencyPlugin`]
//! resolved through the lab caches without blocking; a
//! [`DependencyManager`] drives a step's plugins to completion and
//! re-resolves any of them a later change invalidates.
//!
//! ```text
//! DependencyManager --get--> LabCaches --Command--> server
//!        ^                       |
//!        +---- answers/changes --+
//! ```

mod anchor;
pub mod dependencies;
mod manager;
mod plugin;
mod registry;

pub use anchor::Anchor;
pub use dependencies::{
    AcidTempDependency, ConstantDependency, RefGasDependency, StandardDependency,
};
pub use manager::{DependencyManager, Resolution};
pub use plugin::{DependencyPlugin, ResolveContext};
pub use registry::{BulkCo2Step, ClumpedCo2Step, StepController, StepFactory, StepRegistry};
