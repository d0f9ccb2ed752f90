//! # API Unit
//!
//! Depends on the [`db`](crate::db) unit. On start it looks the pool up through the
//! orchestrator and runs a heartbeat task against it until shutdown.
//!
//! ```yaml
//! api:
//!   port: 8080
//!   heartbeat_ms: 1000
//! ```

use crate::db::{DbHandle, DbUnit};
use async_trait::async_trait;
use machinery::framework::{BaseUnit, Unit, UnitError};
use machinery::lifecycle::Orchestrator;
use machinery::runtime::ConfigValue;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiSettings {
    pub port: u16,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

fn default_heartbeat_ms() -> u64 {
    1000
}

pub struct ApiUnit {
    base: BaseUnit,
    beats: Arc<AtomicU64>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ApiUnit {
    pub const NAME: &'static str = "api";

    pub fn new() -> Self {
        Self {
            base: BaseUnit::new(Self::NAME),
            beats: Arc::new(AtomicU64::new(0)),
            stop: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Successful heartbeats so far. The counter outlives the unit's move into the orchestrator.
    pub fn beat_counter(&self) -> Arc<AtomicU64> {
        self.beats.clone()
    }
}

impl Default for ApiUnit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Unit for ApiUnit {
    fn base(&self) -> &BaseUnit {
        &self.base
    }

    async fn configure(&self, config: ConfigValue) -> Result<(), UnitError> {
        let settings: ApiSettings = config.deserialize()?;
        if settings.heartbeat_ms == 0 {
            return Err(UnitError::Failed("heartbeat_ms must be positive".to_string()));
        }
        self.base.store_config(config);
        Ok(())
    }

    async fn start(&self, orchestrator: &Orchestrator) -> Result<(), UnitError> {
        let settings: ApiSettings = self.base.config_as()?;
        let db = orchestrator
            .provided::<DbHandle>(DbUnit::NAME)
            .ok_or_else(|| UnitError::MissingDependency(DbUnit::NAME.to_string()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let period = Duration::from_millis(settings.heartbeat_ms);
        let task = tokio::spawn(
            heartbeat(db, period, self.beats.clone(), stop_rx)
                .instrument(tracing::info_span!("heartbeat", port = settings.port)),
        );
        *self.stop.lock().await = Some(stop_tx);
        *self.task.lock().await = Some(task);

        self.base
            .log()
            .info(&format!("api listening on port {}", settings.port));
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(stop) = self.stop.lock().await.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                self.base.log().error(&format!("heartbeat task failed: {e}"));
            }
        }
        self.base.log().info("api went down");
    }
}

async fn heartbeat(
    db: Arc<DbHandle>,
    period: Duration,
    beats: Arc<AtomicU64>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => match db.ping().await {
                Ok(()) => {
                    let n = beats.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(beat = n, url = db.url(), "heartbeat");
                }
                Err(e) => warn!(error = %e, "heartbeat failed"),
            },
        }
    }
}
