//! Lifecycle orchestration.
//!
//! - [`Orchestrator`] - owns the registry and drives configure → start → run → shutdown
//! - [`LifecycleState`] - the one-way state machine it moves through
//! - [`signal`] - SIGINT/SIGTERM listener that triggers graceful termination

pub mod orchestrator;
pub mod signal;
pub mod state;

pub use orchestrator::{config_key, Orchestrator, ShutdownReport, DEFAULT_GRACE_INTERVAL};
pub use signal::Signal;
pub use state::LifecycleState;
