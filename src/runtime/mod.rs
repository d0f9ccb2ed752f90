//! Collaborators the orchestrator consumes but does not own.
//!
//! # Main Components
//!
//! - [`ConfigProvider`] / [`Configuration`] - the configuration snapshot, loaded once at process entry
//! - [`LogSink`] / [`TracingSink`] - leveled logging capability injected into the orchestrator and units
//! - [`setup_tracing`] - installs the console and rolling-file `tracing` layers from the `log` config section

pub mod config;
pub mod tracing;

pub use config::{
    ConfigProvider, ConfigValue, Configuration, ConsoleSettings, FileLogSettings, LogFormat,
    LogRotation, LogSettings, ServiceInfo, PROFILE_ENV, SEARCH_DIRS,
};
pub use self::tracing::{build_subscriber, setup_tracing, LogLevel, LogSink, NullSink, TracingSink};
