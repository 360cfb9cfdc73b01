//! Easotope Core - Lab Entity Types
//!
//! Pure data structures shared by the client caches and the dependency
//! engine: entity records, identity aliases, the error taxonomy and the
//! configuration types. This crate contains no I/O.

mod config;
mod entities;
mod error;
mod identity;
mod object;

pub use config::{CacheConfig, LoggingConfig};
pub use entities::{
    AcidTemp, ConstantTable, MassSpec, PhysicalConstant, RefGas, RefGasList, RefGasSummary,
    Standard,
};
pub use error::{CacheError, ConfigError, DependencyError, EasotopeError, EasotopeResult};
pub use identity::{new_instance_id, EntityId, InstanceId, Timestamp, NO_ENTITY};
pub use object::LabObject;
