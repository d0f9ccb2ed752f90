//! # Machinery Errors
//!
//! Error types shared by the orchestrator, the units and the configuration layer.
//! Startup preconditions are all variants of [`MachineryError`]; whatever a unit
//! reports from its own hooks travels as a [`UnitError`].

use crate::lifecycle::LifecycleState;
use std::path::PathBuf;

/// Errors raised by the orchestrator itself.
///
/// Every variant except [`MachineryError::Config`] and [`MachineryError::Logging`]
/// is fatal for the hosting process: there is no partial-startup recovery and no
/// rollback of units that were already started.
#[derive(Debug, thiserror::Error)]
pub enum MachineryError {
    #[error("no configuration found for unit {unit} (key `{key}`)")]
    MissingConfig { unit: String, key: String },
    #[error("unit {unit} failed to configure: {source}")]
    Configure {
        unit: String,
        #[source]
        source: UnitError,
    },
    #[error("unit {unit} failed to start: {source}")]
    Start {
        unit: String,
        #[source]
        source: UnitError,
    },
    #[error("orchestrator already started (state: {0})")]
    AlreadyStarted(LifecycleState),
    #[error("cannot register unit {unit}: registration is closed once start begins")]
    RegistryFrozen { unit: String },
    #[error("failed to install termination signal handlers: {0}")]
    SignalHandler(#[source] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to install logging: {0}")]
    Logging(String),
}

/// Errors a unit reports from `configure` or `start`.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("unit {0} has not been configured")]
    NotConfigured(String),
    #[error("required unit {0} is not registered or provides nothing")]
    MissingDependency(String),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors produced while loading or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration file found (searched: {searched:?})")]
    NotFound { searched: Vec<PathBuf> },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("configuration root must be a mapping")]
    NotAMapping,
    #[error("failed to decode configuration key `{key}`: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },
}
