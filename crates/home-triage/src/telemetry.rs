use crate::config::TelemetryConfig;
use tracing::debug;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("APP_LOG_LEVEL={directive:?} is not a valid tracing filter")]
    InvalidFilter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Where the active log filter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOrigin {
    RustLog,
    AppConfig,
}

/// `RUST_LOG` wins when it parses; otherwise the configured level must.
pub fn log_filter(config: &TelemetryConfig) -> Result<(EnvFilter, FilterOrigin), TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok((filter, FilterOrigin::RustLog));
    }
    EnvFilter::try_new(&config.log_level)
        .map(|filter| (filter, FilterOrigin::AppConfig))
        .map_err(|source| TelemetryError::InvalidFilter {
            directive: config.log_level.clone(),
            source,
        })
}

/// Install the global subscriber. Logs go to stderr; stdout carries report output.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let (filter, origin) = log_filter(config)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .try_init()
        .map_err(TelemetryError::AlreadyInstalled)?;

    debug!(?origin, configured = %config.log_level, "logging initialised");
    Ok(())
}
