use std::str::FromStr;
use std::time::Duration;

use ferry_core::config::PoolConfig;
use ferry_core::{ConnectionDescriptor, EngineKind};
use sqlx::mysql::MySqlConnectOptions;
use sqlx::pool::PoolOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::Database;
use tracing::{debug, info};

use crate::error::{ConnectError, Result};
use crate::live::{LiveConnection, PoolHandle, PoolLimits};

const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Builds pooled [`LiveConnection`]s from descriptors.
///
/// Pools are created lazily: no backend connection is opened until the first
/// query, so `connect` never blocks on the network. Use [`test_connection`]
/// when an up-front probe is wanted.
#[derive(Debug, Clone)]
pub struct Connector {
    connection_lifetime: Duration,
    idle_timeout: Duration,
}

impl Default for Connector {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

impl Connector {
    pub fn new(connection_lifetime: Duration, idle_timeout: Duration) -> Self {
        Self {
            connection_lifetime,
            idle_timeout,
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(
            Duration::from_secs(config.connection_lifetime_secs),
            Duration::from_secs(config.idle_timeout_secs),
        )
    }

    /// Open a pool for `descriptor`. Must be called from within a Tokio runtime.
    pub fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<LiveConnection> {
        let kind: EngineKind =
            descriptor
                .engine
                .parse()
                .map_err(|_| ConnectError::UnsupportedEngine {
                    name: descriptor.name.clone(),
                    engine: descriptor.engine.clone(),
                })?;
        let limits = self.limits_for(descriptor);
        let url = connection_url(kind, descriptor);
        let failed = |source: sqlx::Error| ConnectError::ConnectFailed {
            name: descriptor.name.clone(),
            source,
        };

        let pool = match kind {
            EngineKind::Postgres => {
                let options = PgConnectOptions::from_str(&url).map_err(failed)?;
                PoolHandle::Postgres(self.pool_options(&limits).connect_lazy_with(options))
            }
            EngineKind::MySql => {
                let options = MySqlConnectOptions::from_str(&url).map_err(failed)?;
                PoolHandle::MySql(self.pool_options(&limits).connect_lazy_with(options))
            }
            EngineKind::Sqlite => {
                let options = SqliteConnectOptions::from_str(&url).map_err(failed)?;
                PoolHandle::Sqlite(self.pool_options(&limits).connect_lazy_with(options))
            }
        };

        debug!(
            connection = %descriptor.name,
            engine = %kind,
            max_open = limits.max_open,
            max_idle = limits.max_idle,
            "connection pool created"
        );
        Ok(LiveConnection::new(descriptor.name.clone(), kind, pool, limits))
    }

    /// `max_open` is at least 1 and `max_idle` never exceeds it.
    fn limits_for(&self, descriptor: &ConnectionDescriptor) -> PoolLimits {
        let max_open = descriptor.max_open.max(1);
        PoolLimits {
            max_open,
            max_idle: descriptor.max_idle.min(max_open),
            max_lifetime: self.connection_lifetime,
        }
    }

    fn pool_options<DB: Database>(&self, limits: &PoolLimits) -> PoolOptions<DB> {
        PoolOptions::new()
            .max_connections(limits.max_open)
            .min_connections(limits.max_idle)
            .max_lifetime(limits.max_lifetime)
            .idle_timeout(self.idle_timeout)
    }
}

/// Driver URL for a descriptor. Credentials and database names are
/// percent-encoded; SQLite files are created when missing.
pub fn connection_url(kind: EngineKind, d: &ConnectionDescriptor) -> String {
    let user = urlencoding::encode(&d.username);
    let password = urlencoding::encode(&d.password);
    let database = urlencoding::encode(&d.database);
    match kind {
        EngineKind::MySql => format!(
            "mysql://{user}:{password}@{}:{}/{database}?charset={}",
            d.host,
            port_or(d.port, DEFAULT_MYSQL_PORT),
            urlencoding::encode(&d.charset),
        ),
        EngineKind::Postgres => format!(
            "postgres://{user}:{password}@{}:{}/{database}?sslmode=disable",
            d.host,
            port_or(d.port, DEFAULT_POSTGRES_PORT),
        ),
        EngineKind::Sqlite => format!("sqlite://{}?mode=rwc", d.database),
    }
}

fn port_or(port: u16, default: u16) -> u16 {
    if port == 0 {
        default
    } else {
        port
    }
}

/// Open a throwaway pool for `descriptor`, run one probe query and close it.
pub async fn test_connection(connector: &Connector, descriptor: &ConnectionDescriptor) -> Result<()> {
    let live = connector.connect(descriptor)?;
    let probe = live.ping().await;
    live.close().await;
    probe.map_err(|source| ConnectError::Probe {
        name: descriptor.name.clone(),
        source,
    })?;
    info!(connection = %descriptor.name, "connection test passed");
    Ok(())
}
