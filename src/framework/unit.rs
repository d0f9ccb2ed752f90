//! # Unit Trait
//!
//! A **unit** is an independently developed component hosted by the
//! [`Orchestrator`]. Every unit satisfies the same five-operation contract:
//!
//! | Operation | Provided? | Default behaviour |
//! |-----------|-----------|-------------------|
//! | [`Unit::name`] | yes | name stored in [`BaseUnit`] |
//! | [`Unit::configure`] | yes | stores the value in [`BaseUnit`] |
//! | [`Unit::start`] | **no** | a unit that does nothing on start does not compile |
//! | [`Unit::provide`] | yes | `None` |
//! | [`Unit::shutdown`] | yes | logs `"<name> went down"` |
//!
//! # Architecture Note
//! There is no inheritance here. Concrete units **embed** a [`BaseUnit`] and hand it out
//! through [`Unit::base`]; every provided method delegates to it. Override only what you need.
//!
//! All methods take `&self`: the orchestrator shares units behind `Arc` while it passes
//! itself to [`Unit::start`]. Mutable unit state lives behind `OnceLock`/`Mutex`.
//!
//! # Example
//!
//! ```rust
//! use machinery::framework::{BaseUnit, Unit, UnitError};
//! use machinery::lifecycle::Orchestrator;
//! use async_trait::async_trait;
//!
//! struct Cache {
//!     base: BaseUnit,
//! }
//!
//! #[async_trait]
//! impl Unit for Cache {
//!     fn base(&self) -> &BaseUnit {
//!         &self.base
//!     }
//!
//!     async fn start(&self, _orchestrator: &Orchestrator) -> Result<(), UnitError> {
//!         self.base.log().info("cache warmed");
//!         Ok(())
//!     }
//! }
//!
//! let cache = Cache { base: BaseUnit::new("cache") };
//! assert_eq!(cache.name(), "cache");
//! ```

use crate::framework::UnitError;
use crate::lifecycle::Orchestrator;
use crate::runtime::{ConfigValue, LogSink, NullSink};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Something a unit exposes to its siblings, e.g. a client handle.
///
/// Retrieve it typed with [`Orchestrator::provided`].
pub type Capability = Arc<dyn Any + Send + Sync>;

/// The contract every hosted component implements.
#[async_trait]
pub trait Unit: Send + Sync + 'static {
    /// The default-behaviour helper this unit embeds.
    fn base(&self) -> &BaseUnit;

    /// Stable identity. Registry key, and (lower-cased) configuration key.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Called once at registration with the process-wide log sink.
    fn attach_logger(&self, log: Arc<dyn LogSink>) {
        self.base().attach_logger(log);
    }

    /// Receives this unit's configuration subtree. Called exactly once, before any unit starts.
    async fn configure(&self, config: ConfigValue) -> Result<(), UnitError> {
        self.base().store_config(config);
        Ok(())
    }

    /// Begins the unit's operation.
    ///
    /// Runs in the orchestrator's driving task. Long-running work must be spawned
    /// from here and stopped again in [`Unit::shutdown`].
    async fn start(&self, orchestrator: &Orchestrator) -> Result<(), UnitError>;

    /// Optionally exposes a capability to sibling units.
    fn provide(&self) -> Option<Capability> {
        None
    }

    /// Releases resources. Must not block indefinitely.
    async fn shutdown(&self) {
        self.base().log().info(&format!("{} went down", self.name()));
    }
}

/// Default behaviour shared by all units: name, stored configuration, attached logger.
pub struct BaseUnit {
    name: String,
    config: OnceLock<ConfigValue>,
    log: OnceLock<Arc<dyn LogSink>>,
}

impl BaseUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: OnceLock::new(),
            log: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the sink. Later calls are ignored.
    pub fn attach_logger(&self, log: Arc<dyn LogSink>) {
        let _ = self.log.set(log);
    }

    /// The attached sink, or a [`NullSink`] before registration.
    pub fn log(&self) -> &dyn LogSink {
        match self.log.get() {
            Some(log) => log.as_ref(),
            None => &NullSink,
        }
    }

    /// Stores the configuration. Returns `false` if one was already stored.
    pub fn store_config(&self, config: ConfigValue) -> bool {
        self.config.set(config).is_ok()
    }

    pub fn config(&self) -> Option<&ConfigValue> {
        self.config.get()
    }

    /// Decodes the stored configuration into `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, UnitError> {
        let config = self
            .config
            .get()
            .ok_or_else(|| UnitError::NotConfigured(self.name.clone()))?;
        Ok(config.deserialize()?)
    }
}

impl fmt::Debug for BaseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseUnit")
            .field("name", &self.name)
            .field("configured", &self.config.get().is_some())
            .field("logger", &self.log.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::RecordingSink;
    use crate::runtime::LogLevel;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Settings {
        port: u16,
    }

    #[test]
    fn test_config_stored_once() {
        let base = BaseUnit::new("api");
        assert!(matches!(base.config_as::<Settings>(), Err(UnitError::NotConfigured(name)) if name == "api"));

        let first = serde_yaml::from_str("port: 8080").unwrap();
        let second = serde_yaml::from_str("port: 9090").unwrap();
        assert!(base.store_config(ConfigValue::new(first)));
        assert!(!base.store_config(ConfigValue::new(second)));

        assert_eq!(base.config_as::<Settings>().unwrap(), Settings { port: 8080 });
    }

    #[test]
    fn test_log_falls_back_to_null_sink() {
        let base = BaseUnit::new("db");
        base.log().info("dropped");

        let sink = Arc::new(RecordingSink::new());
        base.attach_logger(sink.clone());
        base.log().warn("kept");

        assert_eq!(sink.lines(), vec![(LogLevel::Warn, "kept".to_string())]);
    }
}
