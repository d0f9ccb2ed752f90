//! # Database Unit
//!
//! Owns a (simulated) connection pool and provides a [`DbHandle`] to its siblings.
//!
//! ## Configuration
//!
//! ```yaml
//! db:
//!   host: localhost
//!   port: 5432
//!   pool_size: 4
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! // from another unit's `start`
//! let db = orchestrator
//!     .provided::<DbHandle>(DbUnit::NAME)
//!     .ok_or_else(|| UnitError::MissingDependency(DbUnit::NAME.to_string()))?;
//! db.ping().await?;
//! ```

pub mod error;

pub use error::DbError;

use async_trait::async_trait;
use machinery::framework::{BaseUnit, Capability, Unit, UnitError};
use machinery::lifecycle::Orchestrator;
use machinery::runtime::ConfigValue;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    4
}

/// Shared access to the pool. Cloned out to other units through `provide`.
#[derive(Debug)]
pub struct DbHandle {
    url: String,
    pool_size: usize,
    permits: Semaphore,
    closed: AtomicBool,
}

impl DbHandle {
    fn open(settings: &DbSettings) -> Self {
        Self {
            url: format!("db://{}:{}", settings.host, settings.port),
            pool_size: settings.pool_size,
            permits: Semaphore::new(settings.pool_size),
            closed: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Borrows a pooled connection for a round trip.
    pub async fn ping(&self) -> Result<(), DbError> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        let _conn = self.permits.acquire().await.map_err(|_| DbError::Closed)?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Wakes anyone queued on a connection.
        self.permits.close();
    }
}

pub struct DbUnit {
    base: BaseUnit,
    handle: OnceLock<Arc<DbHandle>>,
}

impl DbUnit {
    pub const NAME: &'static str = "db";

    pub fn new() -> Self {
        Self {
            base: BaseUnit::new(Self::NAME),
            handle: OnceLock::new(),
        }
    }
}

impl Default for DbUnit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Unit for DbUnit {
    fn base(&self) -> &BaseUnit {
        &self.base
    }

    async fn configure(&self, config: ConfigValue) -> Result<(), UnitError> {
        let settings: DbSettings = config.deserialize()?;
        if settings.pool_size == 0 {
            return Err(DbError::InvalidPoolSize.into());
        }
        self.base.store_config(config);
        Ok(())
    }

    async fn start(&self, _orchestrator: &Orchestrator) -> Result<(), UnitError> {
        let settings: DbSettings = self.base.config_as()?;
        let handle = Arc::new(DbHandle::open(&settings));
        self.base.log().info(&format!(
            "database pool ready at {} ({} connections)",
            handle.url(),
            handle.pool_size()
        ));
        self.handle
            .set(handle)
            .map_err(|_| UnitError::Failed("database pool already open".to_string()))
    }

    fn provide(&self) -> Option<Capability> {
        self.handle
            .get()
            .map(|handle| handle.clone() as Capability)
    }

    async fn shutdown(&self) {
        if let Some(handle) = self.handle.get() {
            handle.close();
        }
        self.base.log().info("db went down");
    }
}
