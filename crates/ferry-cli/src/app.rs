use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ferry_connect::{ConnectionRegistry, Connector};
use ferry_core::FerryConfig;
use ferry_scheduler::TaskScheduler;
use ferry_store::SqliteStore;
use ferry_sync::SyncEngine;
use tracing::info;

/// Lower bound on the dispatcher tick so a bad config cannot spin the loop.
const MIN_TICK_MILLIS: u64 = 10;

/// Every long-lived component, wired once at startup.
pub struct App {
    pub config: FerryConfig,
    pub store: Arc<SqliteStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub engine: Arc<SyncEngine>,
    pub scheduler: TaskScheduler,
}

impl App {
    /// Open the metadata store (running migrations) and build the registry,
    /// engine and scheduler on top of it. Nothing connects to a backend yet.
    pub fn build(config: FerryConfig) -> anyhow::Result<Self> {
        let db_path = &config.database.path;
        ensure_parent_dir(db_path)?;
        info!(path = %db_path, "opening metadata store");
        let store = Arc::new(SqliteStore::open(db_path)?);

        let registry = Arc::new(ConnectionRegistry::new(Connector::from_config(&config.pool)));
        let engine = Arc::new(SyncEngine::new(store.clone(), registry.clone()));
        let tick = Duration::from_millis(config.scheduler.tick_millis.max(MIN_TICK_MILLIS));
        let scheduler = TaskScheduler::new(engine.clone(), store.clone(), tick);

        Ok(Self {
            config,
            store,
            registry,
            engine,
            scheduler,
        })
    }

    /// Register every enabled connection from the store.
    pub async fn load_connections(&self) -> anyhow::Result<usize> {
        Ok(self.registry.load_enabled(self.store.as_ref()).await?)
    }

    pub fn connector(&self) -> Connector {
        Connector::from_config(&self.config.pool)
    }

    /// Stop the dispatcher, then close every pool.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.registry.close().await;
        info!("shutdown complete");
    }
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    match std::path::Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}
