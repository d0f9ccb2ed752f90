//! # Machinery
//!
//! > **A minimal application runtime for hosting independent units in one process.**
//!
//! Machinery hosts independently developed components ("units"), injects each one's
//! configuration, starts them in a controlled sequence and shuts them down in order when
//! the process receives SIGINT or SIGTERM.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One contract, many units
//! Every unit implements the same five operations: `name`, `configure`, `start`, `provide`,
//! `shutdown`. Four of them have defaults via an embedded [`BaseUnit`](framework::BaseUnit),
//! so a unit only writes what is specific to it. `start` has no default: a unit that does
//! nothing when started is a mistake, and the compiler says so.
//!
//! ### Explicit collaborators
//! The configuration snapshot and the log sink are built once by the host and passed in.
//! Nothing in this crate reaches for a global.
//!
//! ### Deterministic order
//! Units are configured, started and shut down in registration order.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Contract ([`framework`])
//! - **Role**: What a unit is, and where units are kept.
//! - **Key items**: [`Unit`](framework::Unit), [`BaseUnit`](framework::BaseUnit),
//!   [`UnitRegistry`](framework::UnitRegistry).
//!
//! ### 2. The Orchestrator ([`lifecycle`])
//! - **Role**: Drives `Created → Configuring → Starting → Running → ShuttingDown → Stopped`
//!   and owns the termination-signal listener.
//! - **Key items**: [`Orchestrator`](lifecycle::Orchestrator),
//!   [`shutdown`](lifecycle::Orchestrator::shutdown).
//!
//! ### 3. The Collaborators ([`runtime`])
//! - **Role**: Configuration loading and logging.
//! - **Key items**: [`Configuration`](runtime::Configuration), [`LogSink`](runtime::LogSink),
//!   [`setup_tracing`](runtime::setup_tracing).
//!
//! ## 🚀 Quick Start
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> ExitCode {
//!     let config = Configuration::load().expect("configuration");
//!     setup_tracing(&config.log_settings().unwrap_or_default()).ok();
//!
//!     Orchestrator::new(Arc::new(config), Arc::new(TracingSink))
//!         .with(DbUnit::new())
//!         .with(ApiUnit::new())
//!         .run()
//!         .await
//! }
//! ```
//!
//! A complete host lives in `crates/machinery-sample`.
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test --workspace
//! ```

pub mod framework;
pub mod lifecycle;
pub mod runtime;
