//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over `general.log_level`. Installing twice
//! is an error rather than a panic, so tests and embedders can call this
//! freely.

use tracing_subscriber::EnvFilter;

use crate::config::GeneralConfig;
use crate::error::{Result, SimError};

/// Build the log filter: `RUST_LOG` if set and valid, else `general.log_level`.
///
/// # Errors
/// [`SimError::Telemetry`] if the configured level is not a valid directive.
pub fn env_filter(general: &GeneralConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&general.log_level)
        .map_err(|e| SimError::Telemetry(format!("invalid log level '{}': {e}", general.log_level)))
}

/// Install the global `fmt` subscriber.
///
/// # Errors
/// [`SimError::Telemetry`] if the filter is invalid or a global subscriber
/// is already installed.
pub fn init_tracing(general: &GeneralConfig) -> Result<()> {
    let filter = env_filter(general)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if general.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| SimError::Telemetry(e.to_string()))?;

    tracing::info!(
        level = %general.log_level,
        json = general.json_logs,
        "Tracing initialized"
    );
    Ok(())
}
