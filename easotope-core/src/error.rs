//! Error types for Easotope client operations

use thiserror::Error;

/// Local cache failures.
///
/// Remote failures are not errors at this level: they travel through the
/// subscriber error callbacks instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache lock poisoned: {cache}")]
    LockPoisoned { cache: String },

    #[error("Failed to decode result for {plugin}: {reason}")]
    Decode { plugin: String, reason: String },

    #[error("No cache owns correlation id {id}")]
    UnknownCorrelation { id: u64 },
}

/// Dependency resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("No calculation step registered under key {key}")]
    UnknownStep { key: String },

    #[error("Dependency {plugin} received an unexpected object, expected {expected}")]
    UnexpectedObject { plugin: String, expected: String },

    #[error("Dependency {plugin} failed to fetch: {reason}")]
    FetchFailed { plugin: String, reason: String },

    #[error("Dependency {plugin} unavailable: {reason}")]
    Unavailable { plugin: String, reason: String },

    #[error("Dependency index {index} out of range")]
    IndexOutOfRange { index: usize },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Easotope client errors.
#[derive(Debug, Clone, Error)]
pub enum EasotopeError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Easotope client operations.
pub type EasotopeResult<T> = Result<T, EasotopeError>;

// =============================================================================
// TESTS
// =============================================================================
