//! Tracing subscriber bootstrap for applications embedding the link.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::{AppError, Result};

/// Install the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over [`LoggingConfig::filter`].
///
/// # Errors
///
/// Returns `AppError::Config` if the filter directive is invalid or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|err| AppError::Config(format!("invalid log filter: {err}")))?,
    };
    let subscriber = fmt().with_env_filter(env_filter);

    match config.format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
