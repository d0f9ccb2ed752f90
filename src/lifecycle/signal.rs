//! # Termination Signals
//!
//! The orchestrator reacts to interrupt and terminate. [`listen`] registers both
//! handlers **immediately** and returns a future resolving on the first one received,
//! so a signal arriving while units are still starting is not lost.
//!
//! Tests substitute any `Future<Output = Signal>`, typically a `oneshot` receiver,
//! through [`Orchestrator::start_until`](crate::lifecycle::Orchestrator::start_until).

use std::fmt;
use std::future::Future;

/// A termination request delivered to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => f.write_str("SIGINT"),
            Signal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Installs the OS handlers and returns a future that resolves on the first signal.
///
/// Must be called from within a Tokio runtime.
#[cfg(unix)]
pub fn listen() -> std::io::Result<impl Future<Output = Signal> + Send + 'static> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => Signal::Interrupt,
            _ = terminate.recv() => Signal::Terminate,
        }
    })
}

/// Installs the Ctrl+C handler and returns a future that resolves on the first signal.
#[cfg(not(unix))]
pub fn listen() -> std::io::Result<impl Future<Output = Signal> + Send + 'static> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Signal::Interrupt,
            // No handler means no signal can ever arrive.
            Err(_) => std::future::pending().await,
        }
    })
}
