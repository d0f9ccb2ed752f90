//! # Lifecycle State
//!
//! ```text
//! Created ─start()─▶ Configuring ─▶ Starting ─▶ Running ─signal─▶ ShuttingDown ─▶ Stopped
//!    │                                                                ▲
//!    └──────────────────────────── shutdown() ────────────────────────┘
//! ```
//!
//! A direct [`shutdown`](crate::lifecycle::Orchestrator::shutdown) is accepted from any
//! state before `ShuttingDown`.

use std::fmt;

/// Where the orchestrator is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Accepting registrations.
    Created,
    Configuring,
    Starting,
    /// All units started; parked until a termination signal or a direct shutdown.
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    /// States from which a shutdown sweep may begin.
    pub(crate) const SHUTDOWN_FROM: [LifecycleState; 4] = [
        LifecycleState::Created,
        LifecycleState::Configuring,
        LifecycleState::Starting,
        LifecycleState::Running,
    ];

    /// Whether units may still be registered.
    pub fn accepts_registration(self) -> bool {
        self == LifecycleState::Created
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Created => "created",
            LifecycleState::Configuring => "configuring",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_created_accepts_registration() {
        assert!(LifecycleState::Created.accepts_registration());
        assert!(!LifecycleState::Running.accepts_registration());
        assert!(!LifecycleState::SHUTDOWN_FROM.contains(&LifecycleState::ShuttingDown));
        assert_eq!(LifecycleState::ShuttingDown.to_string(), "shutting down");
    }
}
