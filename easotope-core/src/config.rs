//! Configuration types

use crate::{ConfigError, EasotopeError, EasotopeResult};
use serde::{Deserialize, Serialize};

/// Cache behaviour settings shared by every entity cache in one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How many times a save rejected with verify-and-resend is resubmitted
    /// before the error reaches the caller.
    pub max_resend_attempts: u32,
    /// Refetch reload-classified keys on a push event. When false such keys
    /// are evicted, listeners are told, and the next `get` refetches.
    pub reload_on_event: bool,
    /// Log a warning once this many commands are outstanding in one cache.
    pub warn_pending_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_resend_attempts: 3,
            reload_on_event: true,
            warn_pending_threshold: 256,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the verify-and-resend retry cap.
    pub fn with_max_resend_attempts(mut self, attempts: u32) -> Self {
        self.max_resend_attempts = attempts;
        self
    }

    /// Enable or disable refetching on push events.
    pub fn with_reload_on_event(mut self, enabled: bool) -> Self {
        self.reload_on_event = enabled;
        self
    }

    /// Set the outstanding command warning threshold.
    pub fn with_warn_pending_threshold(mut self, threshold: usize) -> Self {
        self.warn_pending_threshold = threshold;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `EASOTOPE_CACHE_MAX_RESEND_ATTEMPTS` (default: 3)
    /// - `EASOTOPE_CACHE_RELOAD_ON_EVENT`: "true" or "false" (default: true)
    /// - `EASOTOPE_CACHE_WARN_PENDING_THRESHOLD` (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_resend_attempts: std::env::var("EASOTOPE_CACHE_MAX_RESEND_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_resend_attempts),
            reload_on_event: std::env::var("EASOTOPE_CACHE_RELOAD_ON_EVENT")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.reload_on_event),
            warn_pending_threshold: std::env::var("EASOTOPE_CACHE_WARN_PENDING_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.warn_pending_threshold),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> EasotopeResult<()> {
        if self.warn_pending_threshold == 0 {
            return Err(EasotopeError::Config(ConfigError::InvalidValue {
                field: "warn_pending_threshold".to_string(),
                value: self.warn_pending_threshold.to_string(),
                reason: "warn_pending_threshold must be greater than 0".to_string(),
            }));
        }

        if self.max_resend_attempts > 100 {
            return Err(EasotopeError::Config(ConfigError::InvalidValue {
                field: "max_resend_attempts".to_string(),
                value: self.max_resend_attempts.to_string(),
                reason: "max_resend_attempts must not exceed 100".to_string(),
            }));
        }

        Ok(())
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Emit JSON lines instead of human readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "easotope=debug,info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Environment variables:
    /// - `EASOTOPE_LOG`: filter directives (default: "easotope=debug,info")
    /// - `EASOTOPE_LOG_JSON`: "true" or "1" for JSON output (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            filter: std::env::var("EASOTOPE_LOG")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.filter),
            json: std::env::var("EASOTOPE_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.json),
        }
    }

    pub fn validate(&self) -> EasotopeResult<()> {
        if self.filter.trim().is_empty() {
            return Err(EasotopeError::Config(ConfigError::MissingRequired {
                field: "filter".to_string(),
            }));
        }
        Ok(())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any resend cap above 100 is rejected, any cap up to 100 is accepted.
        #[test]
        fn prop_resend_cap_bound(attempts in 0u32..1000) {
            let config = CacheConfig::new().with_max_resend_attempts(attempts);
            prop_assert_eq!(config.validate().is_ok(), attempts <= 100);
        }
    }
}
