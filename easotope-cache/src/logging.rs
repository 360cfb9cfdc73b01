//! Log output initialisation.

use easotope_core::{ConfigError, EasotopeResult, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// Call once at startup. Fails instead of panicking if the filter does not
/// parse or a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> EasotopeResult<()> {
    config.validate()?;

    let env_filter = EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::InvalidValue {
        field: "filter".to_string(),
        value: config.filter.clone(),
        reason: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| ConfigError::InvalidValue {
        field: "logging".to_string(),
        value: "global subscriber".to_string(),
        reason: e.to_string(),
    })?;

    tracing::info!(filter = %config.filter, json = config.json, "Logging initialized");
    Ok(())
}
