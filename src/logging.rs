//! Tracing subscriber setup.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::env;

/// Install a global fmt subscriber.
///
/// `SUBTASK_LOG`, when set, overrides `config.filter`. Fails instead of
/// panicking if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(config)?)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(env::LOG_ENV_VAR) {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.filter)
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", config.filter, e))
}
