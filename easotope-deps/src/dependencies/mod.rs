//! Dependency plugins for the bulk and clumped CO2 calculation steps.

mod acid_temp;
mod constant;
mod ref_gas;
mod standard;

pub use acid_temp::AcidTempDependency;
pub use constant::ConstantDependency;
pub use ref_gas::RefGasDependency;
pub use standard::StandardDependency;

use easotope_core::{DependencyError, EasotopeError};

pub(crate) fn unexpected(plugin: &str, expected: impl Into<String>) -> EasotopeError {
    DependencyError::UnexpectedObject {
        plugin: plugin.to_string(),
        expected: expected.into(),
    }
    .into()
}

/// Run `f` with a context over a fresh test lab, as slot 0 of a manager.
#[cfg(test)]
pub(crate) fn with_context<R>(
    anchor: &crate::anchor::Anchor,
    f: impl FnOnce(&crate::plugin::ResolveContext<'_>) -> R,
) -> R {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    let lab = easotope_test_utils::fixtures::test_lab();
    let inbox: crate::plugin::Inbox = Arc::new(Mutex::new(VecDeque::new()));
    let ctx = crate::plugin::ResolveContext::new(anchor, &lab.caches, &inbox, 0, 0);
    f(&ctx)
}
