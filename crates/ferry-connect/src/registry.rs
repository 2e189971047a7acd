use std::collections::HashMap;
use std::sync::Arc;

use ferry_core::ConnectionDescriptor;
use ferry_store::MetadataStore;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::connector::Connector;
use crate::error::{ConnectError, Result};
use crate::live::LiveConnection;

/// Live connections keyed by name.
///
/// Lookups take the read lock and hand out `Arc` clones, so a run keeps its
/// handles alive even if the entry is removed mid-copy. Mutations take the
/// write lock. Pools are closed only after the lock is released; closing
/// waits for checked-out connections to return.
pub struct ConnectionRegistry {
    connector: Connector,
    connections: RwLock<HashMap<String, Arc<LiveConnection>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Open `descriptor` and register it under `name`.
    ///
    /// Fails with [`ConnectError::DuplicateName`] without touching the map if
    /// `name` is taken; a connector failure also leaves the map unchanged.
    #[instrument(skip(self, descriptor), fields(engine = %descriptor.engine))]
    pub async fn add(&self, name: &str, descriptor: &ConnectionDescriptor) -> Result<()> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(name) {
            return Err(ConnectError::DuplicateName {
                name: name.to_string(),
            });
        }
        let live = self.connector.connect(descriptor)?;
        connections.insert(name.to_string(), Arc::new(live));
        info!(connection = %name, "connection registered");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Arc<LiveConnection>> {
        self.connections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectError::NotFound {
                name: name.to_string(),
            })
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.connections.read().await.contains_key(name)
    }

    /// Unregister `name` and close its pool.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<()> {
        let removed = self.connections.write().await.remove(name);
        let Some(live) = removed else {
            return Err(ConnectError::NotFound {
                name: name.to_string(),
            });
        };
        live.close().await;
        info!(connection = %name, "connection removed");
        Ok(())
    }

    /// Registered names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Probe `name` with `SELECT 1`.
    #[instrument(skip(self))]
    pub async fn health_check(&self, name: &str) -> Result<()> {
        let live = self.get(name).await?;
        live.ping().await.map_err(|source| ConnectError::Probe {
            name: name.to_string(),
            source,
        })
    }

    /// Drain the registry and close every pool.
    pub async fn close(&self) {
        let drained: Vec<(String, Arc<LiveConnection>)> =
            self.connections.write().await.drain().collect();
        for (name, live) in drained {
            live.close().await;
            info!(connection = %name, "connection closed");
        }
    }

    /// Register every enabled descriptor in `store` that is not already
    /// registered. Returns how many were added; failures are logged and
    /// skipped.
    #[instrument(skip_all)]
    pub async fn load_enabled(&self, store: &dyn MetadataStore) -> Result<usize> {
        let descriptors = store.load_connection_descriptors()?;
        let mut added = 0;
        let mut failed = 0;
        for descriptor in descriptors.iter().filter(|d| d.enabled) {
            if self.contains(&descriptor.name).await {
                continue;
            }
            match self.add(&descriptor.name, descriptor).await {
                Ok(()) => added += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        connection = %descriptor.name,
                        code = e.code(),
                        error = %e,
                        "skipping connection"
                    );
                }
            }
        }
        info!(added, failed, "connections loaded");
        Ok(added)
    }

    /// Re-register after a descriptor edit: drop `old_name` if present, then
    /// add the new descriptor if it is enabled.
    #[instrument(skip(self, descriptor), fields(new_name = %descriptor.name))]
    pub async fn replace(&self, old_name: &str, descriptor: &ConnectionDescriptor) -> Result<()> {
        match self.remove(old_name).await {
            Ok(()) | Err(ConnectError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        if descriptor.enabled {
            self.add(&descriptor.name, descriptor).await?;
        }
        Ok(())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(Connector::default())
    }
}
