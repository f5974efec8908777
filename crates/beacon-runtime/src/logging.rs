//! Process-wide `tracing` subscriber setup.

use beacon_core::BeaconError;
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `config.log_filter`.
///
/// Returns `Ok(false)` if a global subscriber was already installed, so
/// calling this from several tests or entry points is harmless.
pub fn init_tracing(config: &RuntimeConfig) -> Result<bool, BeaconError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_filter)?,
    };

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok())
}

fn build_filter(directives: &str) -> Result<EnvFilter, BeaconError> {
    EnvFilter::try_new(directives)
        .map_err(|e| BeaconError::invalid(format!("Invalid log filter '{directives}': {e}")))
}
