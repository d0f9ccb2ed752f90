//! # Mock Units & Sinks
//!
//! Test doubles for exercising the orchestrator without real components.
//!
//! - [`RecordingSink`] keeps every log line so tests can assert on warnings and fatal lines.
//! - [`ProbeUnit`] counts its lifecycle calls and can be told to misbehave.
//!
//! ## Pattern: Lifecycle Test
//!
//! ```rust
//! use machinery::framework::mock::{ProbeUnit, RecordingSink};
//! use machinery::lifecycle::Orchestrator;
//! use machinery::runtime::Configuration;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Configuration::from_yaml_str("db: {}").unwrap();
//!     let probe = ProbeUnit::new("db");
//!     let calls = probe.calls();
//!
//!     let orchestrator = Orchestrator::new(Arc::new(config), Arc::new(RecordingSink::new()))
//!         .with(probe);
//!     orchestrator.shutdown().await;
//!
//!     assert_eq!(calls.shutdowns(), 1);
//! }
//! ```

use crate::framework::{BaseUnit, Capability, Unit, UnitError};
use crate::lifecycle::Orchestrator;
use crate::runtime::{ConfigValue, LogLevel, LogSink};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// RECORDING SINK
// =============================================================================

/// A [`LogSink`] that stores every line in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().unwrap().clone()
    }

    /// Whether a line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

// =============================================================================
// PROBE UNIT
// =============================================================================

/// Shared ordered record of lifecycle events across several probes,
/// e.g. `["db:configure", "api:configure", "db:start", ...]`.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Call counters of a [`ProbeUnit`], kept after the unit moves into the orchestrator.
#[derive(Debug, Default)]
pub struct ProbeCalls {
    configures: AtomicUsize,
    starts: AtomicUsize,
    shutdowns: AtomicUsize,
    config: Mutex<Option<ConfigValue>>,
    siblings: Mutex<Vec<String>>,
}

impl ProbeCalls {
    pub fn configures(&self) -> usize {
        self.configures.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// The value last passed to `configure`.
    pub fn config(&self) -> Option<ConfigValue> {
        self.config.lock().unwrap().clone()
    }

    /// Names of the units visible through the orchestrator when `start` ran.
    pub fn siblings(&self) -> Vec<String> {
        self.siblings.lock().unwrap().clone()
    }
}

/// A configurable fake unit.
///
/// # Example
/// ```ignore
/// let journal = Journal::default();
/// let db = ProbeUnit::new("db").with_journal(journal.clone());
/// let broken = ProbeUnit::new("api").failing_start("port in use");
/// let slow = ProbeUnit::new("cache").with_shutdown_delay(Duration::from_secs(5));
/// ```
pub struct ProbeUnit {
    base: BaseUnit,
    calls: Arc<ProbeCalls>,
    journal: Option<Journal>,
    fail_start: Option<String>,
    shutdown_delay: Option<Duration>,
    capability: Option<Capability>,
}

impl ProbeUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseUnit::new(name),
            calls: Arc::new(ProbeCalls::default()),
            journal: None,
            fail_start: None,
            shutdown_delay: None,
            capability: None,
        }
    }

    pub fn calls(&self) -> Arc<ProbeCalls> {
        self.calls.clone()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Makes `start` return [`UnitError::Failed`] with `reason`.
    pub fn failing_start(mut self, reason: impl Into<String>) -> Self {
        self.fail_start = Some(reason.into());
        self
    }

    /// Makes `shutdown` sleep before returning.
    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = Some(delay);
        self
    }

    pub fn providing(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    fn record(&self, event: &str) {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap()
                .push(format!("{}:{event}", self.base.name()));
        }
    }
}

#[async_trait]
impl Unit for ProbeUnit {
    fn base(&self) -> &BaseUnit {
        &self.base
    }

    async fn configure(&self, config: ConfigValue) -> Result<(), UnitError> {
        self.calls.configures.fetch_add(1, Ordering::SeqCst);
        *self.calls.config.lock().unwrap() = Some(config.clone());
        self.base.store_config(config);
        self.record("configure");
        Ok(())
    }

    async fn start(&self, orchestrator: &Orchestrator) -> Result<(), UnitError> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        *self.calls.siblings.lock().unwrap() =
            orchestrator.registry().names().map(str::to_string).collect();
        self.record("start");
        match &self.fail_start {
            Some(reason) => Err(UnitError::Failed(reason.clone())),
            None => Ok(()),
        }
    }

    fn provide(&self) -> Option<Capability> {
        self.capability.clone()
    }

    async fn shutdown(&self) {
        if let Some(delay) = self.shutdown_delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.record("shutdown");
        self.base.log().info(&format!("{} went down", self.base.name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_queries() {
        let sink = RecordingSink::new();
        sink.warn("unit db already registered");
        sink.info("registering api");
        sink.info("starting api");

        assert!(sink.contains(LogLevel::Warn, "already registered"));
        assert!(!sink.contains(LogLevel::Info, "already registered"));
        assert_eq!(sink.count(LogLevel::Info), 2);
        assert_eq!(sink.lines().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_records_configuration() {
        let probe = ProbeUnit::new("db");
        let calls = probe.calls();
        let value = ConfigValue::new(serde_yaml::from_str("host: x").unwrap());

        probe.configure(value.clone()).await.unwrap();

        assert_eq!(calls.configures(), 1);
        assert_eq!(calls.config(), Some(value));
    }
}
