//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level. JSON output is
//! meant for production log shipping; the plain format is for terminals.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging options resolved from configuration and CLI flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

impl LoggingConfig {
    pub fn from_app(app: &AppConfig, verbose: bool) -> Self {
        Self {
            level: if verbose { "debug".to_string() } else { app.log_level.clone() },
            json_format: app.json_logs,
        }
    }

    /// Filter from `RUST_LOG`, else from the configured level
    pub fn filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", self.level, e))),
        }
    }
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = config.filter()?;

    let installed = if config.json_format {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install logger: {}", e)))
}
