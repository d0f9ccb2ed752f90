//! # Machinery Sample
//!
//! A host program wiring two units into one process.
//!
//! ## 📚 Quick Start
//!
//! ```bash
//! cd crates/machinery-sample
//! cargo run                  # reads ./config/config.yaml
//! ENV=dev cargo run          # reads config-dev.yaml instead
//! ```
//!
//! Stop it with Ctrl+C: both units are shut down after the grace interval.

use machinery::lifecycle::Orchestrator;
use machinery::runtime::{setup_tracing, Configuration, TracingSink};
use machinery_sample::api::ApiUnit;
use machinery_sample::db::DbUnit;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Configuration::load() {
        Ok(config) => config,
        Err(e) => {
            // No subscriber yet.
            eprintln!("fatal: {e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = match config.log_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("fatal: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = setup_tracing(&settings) {
        eprintln!("fatal: {e}");
        return ExitCode::FAILURE;
    }

    match config.service() {
        Ok(Some(service)) => info!(
            group = %service.group,
            name = %service.name,
            version = %service.version,
            "starting service"
        ),
        Ok(None) => info!("starting service"),
        Err(e) => error!(error = %e, "ignoring malformed service section"),
    }
    if let Some(path) = config.source() {
        info!(path = %path.display(), "configuration loaded");
    }

    Orchestrator::new(Arc::new(config), Arc::new(TracingSink))
        .with(DbUnit::new())
        .with(ApiUnit::new())
        .run()
        .await
}
