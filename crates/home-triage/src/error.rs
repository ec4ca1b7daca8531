use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::evaluation::{EngineError, PolicyError};
use crate::workflows::listings::ListingImportError;
use crate::workflows::pipeline::{CoordinatorError, RepositoryError};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Policy(PolicyError),
    Engine(EngineError),
    Store(RepositoryError),
    Pipeline(CoordinatorError),
    Listings(ListingImportError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Policy(err) => write!(f, "policy error: {}", err),
            AppError::Engine(err) => write!(f, "evaluation engine error: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
            AppError::Pipeline(err) => write!(f, "pipeline error: {}", err),
            AppError::Listings(err) => write!(f, "listing import error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Policy(err) => Some(err),
            AppError::Engine(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Pipeline(err) => Some(err),
            AppError::Listings(err) => Some(err),
        }
    }
}

impl AppError {
    /// Process exit code: 2 for problems with the supplied configuration or inputs.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Policy(_) | AppError::Listings(_) => 2,
            AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Engine(_)
            | AppError::Store(_)
            | AppError::Pipeline(_) => 1,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<PolicyError> for AppError {
    fn from(value: PolicyError) -> Self {
        Self::Policy(value)
    }
}

impl From<EngineError> for AppError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Store(value)
    }
}

impl From<CoordinatorError> for AppError {
    fn from(value: CoordinatorError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<ListingImportError> for AppError {
    fn from(value: ListingImportError) -> Self {
        Self::Listings(value)
    }
}
