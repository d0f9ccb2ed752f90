use crate::framework::{MachineryError, Unit, UnitRegistry};
use crate::lifecycle::signal::{self, Signal};
use crate::lifecycle::LifecycleState;
use crate::runtime::{ConfigProvider, ConfigValue, LogSink};
use std::any::Any;
use std::future::Future;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

tokio::task_local! {
    /// Identity of the orchestrator whose bring-up the current task is driving.
    static DRIVING: usize;
}

/// Delay between receiving a termination signal and shutting units down,
/// leaving in-flight work time to drain.
pub const DEFAULT_GRACE_INTERVAL: Duration = Duration::from_secs(2);

/// The process-lifetime coordinator of unit configuration, startup and shutdown.
///
/// `Orchestrator` is responsible for:
/// - **Registration**: collecting units by unique name before start
/// - **Configuration injection**: handing each unit its subtree from the [`ConfigProvider`]
/// - **Startup**: starting every unit, in registration order, exactly once
/// - **Termination**: listening for SIGINT/SIGTERM and sweeping every unit's `shutdown`
///
/// # Architecture
///
/// The config snapshot and the log sink are built by the host at process entry and
/// passed in. There is no global singleton; the orchestrator shares both with whoever
/// needs them (units get the sink at registration and can read `config()` during start).
///
/// Registration needs `&mut self`; `start` needs only `&self`. Once `start` is running
/// the orchestrator is shared (typically behind `Arc`), so the registry cannot change
/// underneath it. Registering after `start` has begun returns
/// [`MachineryError::RegistryFrozen`].
///
/// # Example
///
/// ```ignore
/// let config = Arc::new(Configuration::load()?);
/// let orchestrator = Orchestrator::new(config, Arc::new(TracingSink))
///     .with(DbUnit::new())
///     .with(ApiUnit::new());
///
/// // Blocks until SIGINT/SIGTERM, then shuts every unit down.
/// orchestrator.run().await
/// ```
pub struct Orchestrator {
    registry: UnitRegistry,
    config: Arc<dyn ConfigProvider>,
    log: Arc<dyn LogSink>,
    state: watch::Sender<LifecycleState>,
    grace: Duration,
    shutdown_timeout: Option<Duration>,
    /// Set while a `start` call is configuring or starting units.
    driving: AtomicBool,
    /// Claimed by the one task that runs the shutdown sweep.
    swept: AtomicBool,
}

/// Outcome of a shutdown sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Units whose `shutdown` returned, in sweep order.
    pub stopped: Vec<String>,
    /// Units abandoned after exceeding the per-unit shutdown timeout.
    pub timed_out: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty()
    }
}

impl Orchestrator {
    pub fn new(config: Arc<dyn ConfigProvider>, log: Arc<dyn LogSink>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            registry: UnitRegistry::new(),
            config,
            log,
            state,
            grace: DEFAULT_GRACE_INTERVAL,
            shutdown_timeout: None,
            driving: AtomicBool::new(false),
            swept: AtomicBool::new(false),
        }
    }

    /// Overrides the delay between a termination signal and the shutdown sweep.
    pub fn with_grace_interval(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Bounds each unit's `shutdown`. Units exceeding it are reported and skipped.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Registers a unit, fluently. Duplicates are logged and dropped.
    pub fn with(mut self, unit: impl Unit) -> Self {
        let _ = self.register(Arc::new(unit));
        self
    }

    pub fn with_units<I>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Unit>>,
    {
        for unit in units {
            let _ = self.register(unit);
        }
        self
    }

    /// Registers a unit and attaches the log sink to it.
    ///
    /// Returns `Ok(false)` for a duplicate name (the first registration stays).
    pub fn register(&mut self, unit: Arc<dyn Unit>) -> Result<bool, MachineryError> {
        let name = unit.name().to_string();
        let state = self.state();
        if !state.accepts_registration() {
            self.log.error(&format!(
                "refusing to register unit {name}: orchestrator is {state}"
            ));
            return Err(MachineryError::RegistryFrozen { unit: name });
        }
        if self.registry.contains(&name) {
            self.log.warn(&format!("unit {name} already registered"));
            return Ok(false);
        }
        self.log.info(&format!("registering {name} unit"));
        unit.attach_logger(self.log.clone());
        Ok(self.registry.register(unit))
    }

    pub fn get_unit(&self, name: &str) -> Option<Arc<dyn Unit>> {
        self.registry.lookup(name).cloned()
    }

    /// The capability unit `name` provides, downcast to `T`.
    ///
    /// `None` when the unit is missing, provides nothing, or provides another type.
    pub fn provided<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.registry
            .lookup(name)?
            .provide()?
            .downcast::<T>()
            .ok()
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// The shared configuration snapshot.
    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    pub fn logger(&self) -> Arc<dyn LogSink> {
        self.log.clone()
    }

    pub fn grace_interval(&self) -> Duration {
        self.grace
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Resolves once the orchestrator has reached `target`.
    ///
    /// States are only observed, not queued: waiting for a state that was already
    /// left behind never resolves. `Stopped` is terminal and therefore always safe.
    pub async fn wait_for_state(&self, target: LifecycleState) {
        let mut states = self.state.subscribe();
        loop {
            let reached = *states.borrow_and_update() == target;
            if reached || states.changed().await.is_err() {
                return;
            }
        }
    }

    /// Starts with SIGINT/SIGTERM as the termination trigger.
    ///
    /// Returns once the orchestrator has stopped, or with the fatal error that
    /// aborted startup.
    pub async fn start(&self) -> Result<(), MachineryError> {
        let signal = signal::listen().map_err(|source| {
            self.log
                .fatal(&format!("cannot install termination signal handlers: {source}"));
            MachineryError::SignalHandler(source)
        })?;
        self.start_until(signal).await
    }

    /// Starts with `signal` as the termination trigger.
    ///
    /// 1. configure every unit (fatal if any unit has no configuration entry)
    /// 2. start every unit
    /// 3. park until `signal` resolves or `shutdown()` is called directly
    /// 4. on signal: wait the grace interval, then shut every unit down
    ///
    /// `signal` is polled from the moment this is called. A signal arriving mid-startup
    /// lets the current bring-up finish and is acted on right after. A direct
    /// [`shutdown`](Self::shutdown) arriving mid-startup waits for the unit currently
    /// configuring or starting, then the remaining units are skipped and the sweep runs.
    pub async fn start_until<F>(&self, signal: F) -> Result<(), MachineryError>
    where
        F: Future<Output = Signal> + Send + 'static,
    {
        // Flag and state change together so a concurrent `shutdown` sees both or neither.
        let mut state = LifecycleState::Created;
        let claimed = self.state.send_if_modified(|current| {
            state = *current;
            if *current != LifecycleState::Created {
                return false;
            }
            self.driving.store(true, Ordering::SeqCst);
            *current = LifecycleState::Configuring;
            true
        });
        if !claimed {
            self.log
                .error(&format!("start called while orchestrator is {state}"));
            return Err(MachineryError::AlreadyStarted(state));
        }

        let mut listener = tokio::spawn(signal);

        let brought_up = DRIVING.scope(self.identity(), self.bring_up()).await;
        self.driving.store(false, Ordering::SeqCst);

        if self.state() == LifecycleState::ShuttingDown {
            self.log.info("shutdown requested during startup");
            self.sweep().await;
        }

        if let Err(e) = brought_up {
            listener.abort();
            return Err(e);
        }

        if self
            .transition(&[LifecycleState::Starting], LifecycleState::Running)
            .is_ok()
        {
            self.log.info("app machinery started");
        }

        tokio::select! {
            received = &mut listener => match received {
                Ok(signal) => self.terminate(signal).await,
                Err(e) => {
                    self.log.error(&format!("signal listener stopped: {e}"));
                    self.wait_for_state(LifecycleState::Stopped).await;
                }
            },
            _ = self.wait_for_state(LifecycleState::Stopped) => {
                listener.abort();
                self.log.info("machinery stopped");
            }
        }

        Ok(())
    }

    /// Runs [`start`](Self::start) and maps the outcome to a process exit code.
    pub async fn run(&self) -> ExitCode {
        match self.start().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        }
    }

    /// Shuts every registered unit down, in registration order.
    ///
    /// At most one sweep ever runs. A second (or concurrent) call waits for the first
    /// to finish and returns an empty report. No grace interval, no process exit.
    ///
    /// While units are being configured or started, the sweep is left to the task
    /// driving [`start`](Self::start): it runs once the in-flight unit returns, so no
    /// unit is shut down while its `start` is still running. This call then waits for
    /// `Stopped` and returns an empty report. Called from inside a unit's own `start`,
    /// it only requests the shutdown and returns immediately.
    pub async fn shutdown(&self) -> ShutdownReport {
        let previous = match self
            .transition(&LifecycleState::SHUTDOWN_FROM, LifecycleState::ShuttingDown)
        {
            Ok(previous) => previous,
            Err(state) => {
                self.log
                    .debug(&format!("shutdown already handled (orchestrator is {state})"));
                self.wait_for_state(LifecycleState::Stopped).await;
                return ShutdownReport::default();
            }
        };

        let mid_startup = matches!(
            previous,
            LifecycleState::Configuring | LifecycleState::Starting
        );
        if mid_startup && self.driving.load(Ordering::SeqCst) {
            self.log
                .info("shutdown requested during startup, waiting for the unit in flight");
            if !self.is_driving_task() {
                self.wait_for_state(LifecycleState::Stopped).await;
            }
            return ShutdownReport::default();
        }

        self.sweep().await
    }

    async fn sweep(&self) -> ShutdownReport {
        if self.swept.swap(true, Ordering::SeqCst) {
            self.wait_for_state(LifecycleState::Stopped).await;
            return ShutdownReport::default();
        }

        self.log.info("shutting down the machinery");
        let mut report = ShutdownReport::default();

        for unit in self.registry.iter() {
            let name = unit.name().to_string();
            self.log.info(&format!("shutting down the {name} unit"));
            let sweep = unit.shutdown().instrument(unit_span(&name));

            match self.shutdown_timeout {
                Some(limit) => match tokio::time::timeout(limit, sweep).await {
                    Ok(()) => report.stopped.push(name),
                    Err(_) => {
                        self.log.warn(&format!(
                            "unit {name} did not shut down within {limit:?}, moving on"
                        ));
                        report.timed_out.push(name);
                    }
                },
                None => {
                    sweep.await;
                    report.stopped.push(name);
                }
            }
        }

        self.state.send_replace(LifecycleState::Stopped);
        report
    }

    async fn terminate(&self, signal: Signal) {
        self.log.info(&format!("caught signal: {signal}"));
        self.log.info(&format!(
            "waiting {:?} for in-flight work to finish",
            self.grace
        ));
        tokio::time::sleep(self.grace).await;

        let report = self.shutdown().await;
        if !report.is_clean() {
            self.log.warn(&format!(
                "units still running at exit: {}",
                report.timed_out.join(", ")
            ));
        }
        self.log
            .info("all units went down, shutting down the machinery");
        self.log.info("bye!");
    }

    async fn bring_up(&self) -> Result<(), MachineryError> {
        self.log.info("configuring machinery units");
        if !self.configure_units().await? {
            return Ok(());
        }

        if self
            .transition(&[LifecycleState::Configuring], LifecycleState::Starting)
            .is_err()
        {
            return Ok(());
        }

        self.log.info("starting machinery units");
        self.start_units().await
    }

    /// Resolves every unit's configuration first, so a missing entry aborts
    /// before any unit is touched. Returns `false` if a direct shutdown interrupted.
    async fn configure_units(&self) -> Result<bool, MachineryError> {
        let mut resolved: Vec<(&Arc<dyn Unit>, ConfigValue)> =
            Vec::with_capacity(self.registry.len());

        for unit in self.registry.iter() {
            let key = config_key(unit.name());
            match self.config.get(&key) {
                Some(value) => resolved.push((unit, value.with_key(key.as_str()))),
                None => {
                    self.log.fatal(&format!(
                        "no configuration found for unit {} (key `{key}`)",
                        unit.name()
                    ));
                    return Err(MachineryError::MissingConfig {
                        unit: unit.name().to_string(),
                        key,
                    });
                }
            }
        }

        for (unit, value) in resolved {
            if self.state() != LifecycleState::Configuring {
                return Ok(false);
            }
            let name = unit.name();
            self.log.debug(&format!(
                "found configuration for {name} unit: {:?}",
                value.as_value()
            ));
            unit.configure(value)
                .instrument(unit_span(name))
                .await
                .map_err(|source| {
                    self.log
                        .fatal(&format!("unit {name} failed to configure: {source}"));
                    MachineryError::Configure {
                        unit: name.to_string(),
                        source,
                    }
                })?;
        }

        Ok(true)
    }

    async fn start_units(&self) -> Result<(), MachineryError> {
        for unit in self.registry.iter() {
            if self.state() != LifecycleState::Starting {
                return Ok(());
            }
            let name = unit.name();
            self.log.info(&format!("starting the {name} unit"));
            unit.start(self)
                .instrument(unit_span(name))
                .await
                .map_err(|source| {
                    self.log
                        .fatal(&format!("unit {name} failed to start: {source}"));
                    MachineryError::Start {
                        unit: name.to_string(),
                        source,
                    }
                })?;
        }
        Ok(())
    }

    /// Moves to `to` if the current state is one of `from`.
    ///
    /// Returns the state moved away from, or the current state when it was not in `from`.
    fn transition(
        &self,
        from: &[LifecycleState],
        to: LifecycleState,
    ) -> Result<LifecycleState, LifecycleState> {
        let mut current = to;
        let moved = self.state.send_if_modified(|state| {
            current = *state;
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(current)
        } else {
            Err(current)
        }
    }

    fn identity(&self) -> usize {
        self as *const Self as usize
    }

    /// Whether the caller runs inside this orchestrator's own bring-up, i.e. a unit's
    /// `configure` or `start`.
    fn is_driving_task(&self) -> bool {
        DRIVING
            .try_with(|id| *id == self.identity())
            .unwrap_or(false)
    }
}

/// Configuration key for a unit: its name, case-folded.
pub fn config_key(name: &str) -> String {
    name.to_lowercase()
}

fn unit_span(name: &str) -> tracing::Span {
    tracing::info_span!("unit", name = %name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::{ProbeUnit, RecordingSink};
    use crate::runtime::{Configuration, LogLevel};

    fn orchestrator(yaml: &str) -> (Orchestrator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let config = Configuration::from_yaml_str(yaml).unwrap();
        (Orchestrator::new(Arc::new(config), sink.clone()), sink)
    }

    #[test]
    fn test_config_key_is_case_folded() {
        assert_eq!(config_key("HttpApi"), "httpapi");
    }

    #[test]
    fn test_duplicate_registration_warns() {
        let (mut orch, sink) = orchestrator("db: {}");

        assert!(orch.register(Arc::new(ProbeUnit::new("db"))).unwrap());
        assert!(!orch.register(Arc::new(ProbeUnit::new("db"))).unwrap());

        assert_eq!(orch.registry().len(), 1);
        assert!(sink.contains(LogLevel::Warn, "unit db already registered"));
    }

    #[tokio::test]
    async fn test_registration_closed_after_stop() {
        let (mut orch, _sink) = orchestrator("db: {}");
        orch.shutdown().await;

        let err = orch.register(Arc::new(ProbeUnit::new("late"))).unwrap_err();
        assert!(matches!(err, MachineryError::RegistryFrozen { unit } if unit == "late"));
        assert!(orch.get_unit("late").is_none());
    }

    #[tokio::test]
    async fn test_transition_rejects_unexpected_state() {
        let (orch, _sink) = orchestrator("");
        assert!(orch
            .transition(&[LifecycleState::Running], LifecycleState::Stopped)
            .is_err());
        assert_eq!(orch.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn test_provided_downcasts() {
        let (orch, _sink) = orchestrator("db: {}");
        let orch = orch.with(ProbeUnit::new("db").providing(Arc::new(String::from("pool"))));

        assert_eq!(orch.provided::<String>("db").as_deref(), Some(&"pool".to_string()));
        assert!(orch.provided::<u32>("db").is_none());
        assert!(orch.provided::<String>("missing").is_none());
    }
}
