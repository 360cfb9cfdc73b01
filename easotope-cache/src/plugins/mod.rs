//! Entity plugins for the lab records the client caches.
//!
//! | plugin | key | get | save | delete |
//! |---|---|---|---|---|
//! | [`MassSpecPlugin`] | [`MassSpecKey`] | yes | yes | no |
//! | [`StandardPlugin`] | [`StandardKey`] | yes | yes | yes |
//! | [`RefGasPlugin`] | [`RefGasKey`] | yes | yes | yes |
//! | [`RefGasListPlugin`] | [`RefGasListKey`] | yes | no | no |
//! | [`AcidTempPlugin`] | [`AcidTempKey`] | yes | yes | no |
//! | [`ConstantPlugin`] | [`ConstantKey`] | yes | no | no |
//!
//! Unsupported operations panic.

mod acid_temp;
mod constant;
mod mass_spec;
mod ref_gas;
mod ref_gas_list;
mod standard;

pub use acid_temp::{AcidTempKey, AcidTempPlugin};
pub use constant::{ConstantKey, ConstantPlugin};
pub use mass_spec::{MassSpecKey, MassSpecPlugin};
pub use ref_gas::{RefGasKey, RefGasPlugin};
pub use ref_gas_list::{RefGasListKey, RefGasListPlugin};
pub use standard::{StandardKey, StandardPlugin};
