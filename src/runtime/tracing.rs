//! # Logging & Tracing
//!
//! The orchestrator never builds a concrete logger. It consumes a [`LogSink`], a narrow
//! leveled-logging capability that the host constructs once at process entry and injects
//! into the [`Orchestrator`](crate::lifecycle::Orchestrator) and, through it, into every unit.
//!
//! ## Sinks
//!
//! - [`TracingSink`] forwards every line to the `tracing` macros. This is what a real host uses.
//! - [`NullSink`] drops everything. Units fall back to it until a logger is attached.
//! - [`RecordingSink`](crate::framework::mock::RecordingSink) captures lines for assertions in tests.
//!
//! ## Subscriber
//!
//! [`setup_tracing`] installs `tracing-subscriber` fmt layers from the `log` section of
//! the configuration file: one on the console and, when `log.file` is set, one on a
//! `tracing-appender` rolling file. `RUST_LOG` always wins over the configured level:
//!
//! ```bash
//! # Lifecycle transitions only
//! RUST_LOG=info cargo run -p machinery-sample
//!
//! # Include per-unit configuration dumps
//! RUST_LOG=debug cargo run -p machinery-sample
//! ```
//!
//! Each unit operation runs inside a `unit` span, so with the compact format a line reads:
//!
//! ```text
//! INFO unit{name="db"}: database pool ready at db://localhost:5432 (4 connections)
//! ```

use crate::framework::MachineryError;
use crate::runtime::config::{FileLogSettings, LogFormat, LogRotation, LogSettings};
use std::fmt;
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Severity of a line written through a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    /// An unrecoverable condition. The caller stops right after emitting it.
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Leveled logging capability consumed by the orchestrator and the units.
///
/// Only [`LogSink::log`] is required; the per-level helpers are provided.
///
/// `fatal` only records the line. Terminating is the caller's job: the orchestrator
/// returns a [`MachineryError`] right after calling it.
pub trait LogSink: Send + Sync {
    /// Writes one already-formatted line.
    fn log(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn fatal(&self, message: &str) {
        self.log(LogLevel::Fatal, message);
    }
}

/// A [`LogSink`] backed by the global `tracing` dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Fatal => tracing::error!(fatal = true, "{message}"),
        }
    }
}

/// A [`LogSink`] that discards every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Installs the global `tracing` subscriber described by `settings`.
///
/// `RUST_LOG` takes precedence over `settings.level`. Calling this twice returns
/// [`MachineryError::Logging`] instead of panicking.
///
/// # Example
///
/// ```ignore
/// let config = Configuration::load()?;
/// setup_tracing(&config.log_settings()?)?;
/// tracing::info!("logging ready");
/// ```
pub fn setup_tracing(settings: &LogSettings) -> Result<(), MachineryError> {
    build_subscriber(settings)?
        .try_init()
        .map_err(|e| MachineryError::Logging(e.to_string()))
}

/// Builds the subscriber [`setup_tracing`] would install, without installing it.
///
/// Up to two fmt layers share one `EnvFilter`: the console (unless
/// `console.enabled` is off) and a rolling file when `log.file` is set.
pub fn build_subscriber(
    settings: &LogSettings,
) -> Result<impl Subscriber + Send + Sync + 'static, MachineryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(&settings.level)?,
    };

    let console = settings.console.enabled.then(|| console_layer(settings));
    let file = settings
        .file
        .as_ref()
        .map(|file| file_layer(file, settings.target))
        .transpose()?;

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file))
}

fn configured_filter(level: &str) -> Result<EnvFilter, MachineryError> {
    EnvFilter::try_new(level)
        .map_err(|e| MachineryError::Logging(format!("invalid level `{level}`: {e}")))
}

fn console_layer<S>(settings: &LogSettings) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(settings.target)
        .with_ansi(settings.ansi);

    match settings.format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn file_layer<S>(
    file: &FileLogSettings,
    target: bool,
) -> Result<Box<dyn Layer<S> + Send + Sync>, MachineryError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let rotation = match file.rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };

    std::fs::create_dir_all(&file.path).map_err(|e| {
        MachineryError::Logging(format!("cannot create {}: {e}", file.path.display()))
    })?;

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file.filename.clone());
    if let Some(max_files) = file.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&file.path).map_err(|e| {
        MachineryError::Logging(format!(
            "cannot open log file in {}: {e}",
            file.path.display()
        ))
    })?;

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_target(target);

    Ok(if file.json {
        layer.json().boxed()
    } else {
        layer.boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::ConsoleSettings;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<LogLevel>>);

    impl LogSink for Collect {
        fn log(&self, level: LogLevel, _message: &str) {
            self.0.lock().unwrap().push(level);
        }
    }

    #[test]
    fn test_provided_helpers_route_to_log() {
        let sink = Collect(Mutex::new(Vec::new()));
        sink.debug("d");
        sink.info("i");
        sink.warn("w");
        sink.error("e");
        sink.fatal("f");

        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![
                LogLevel::Debug,
                LogLevel::Info,
                LogLevel::Warn,
                LogLevel::Error,
                LogLevel::Fatal
            ]
        );
    }

    #[test]
    fn test_level_display_and_order() {
        assert_eq!(LogLevel::Fatal.to_string(), "fatal");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert!(LogLevel::Debug < LogLevel::Fatal);
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let err = configured_filter("db=loud").unwrap_err();
        assert!(matches!(err, MachineryError::Logging(ref msg) if msg.contains("db=loud")));

        // RUST_LOG takes precedence, so the configured level only matters without it.
        if std::env::var_os("RUST_LOG").is_none() {
            let settings = LogSettings {
                level: "=!bad".to_string(),
                ..LogSettings::default()
            };
            assert!(matches!(
                setup_tracing(&settings),
                Err(MachineryError::Logging(_))
            ));
        }
    }

    #[test]
    fn test_second_install_is_an_error() {
        let settings = LogSettings {
            level: "info".to_string(),
            ..LogSettings::default()
        };
        // The first call may already have lost to another test in this binary.
        let _ = setup_tracing(&settings);

        assert!(matches!(
            setup_tracing(&settings),
            Err(MachineryError::Logging(_))
        ));
    }

    #[test]
    fn test_file_layer_writes_to_log_dir() {
        let dir = std::env::temp_dir().join(format!("machinery-logs-{}", std::process::id()));
        let settings = LogSettings {
            level: "info".to_string(),
            console: ConsoleSettings { enabled: false },
            file: Some(FileLogSettings {
                path: dir.clone(),
                filename: "unit.log".to_string(),
                rotation: LogRotation::Never,
                max_files: None,
                json: true,
            }),
            ..LogSettings::default()
        };

        let subscriber = build_subscriber(&settings).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(unit = "db", "pool exhausted");
        });

        let written = std::fs::read_to_string(dir.join("unit.log")).unwrap();
        assert!(written.contains("pool exhausted"));
        assert!(written.contains(r#""unit":"db""#));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
