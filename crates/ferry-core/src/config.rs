use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Upper bound on how long a pooled backend connection may live.
pub const DEFAULT_CONNECTION_LIFETIME_SECS: u64 = 3600;
/// Idle pooled connections above the warm floor are reaped after this long.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
/// Scheduler dispatcher cadence.
pub const DEFAULT_TICK_MILLIS: u64 = 1000;

/// Top-level config (ferry.toml + FERRY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FerryConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Where the metadata store (connections, tasks, run records) lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Pool settings applied to every registered backend connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_connection_lifetime_secs")]
    pub connection_lifetime_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connection_lifetime_secs: DEFAULT_CONNECTION_LIFETIME_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the dispatcher checks for due triggers.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_millis: DEFAULT_TICK_MILLIS,
        }
    }
}

fn default_connection_lifetime_secs() -> u64 {
    DEFAULT_CONNECTION_LIFETIME_SECS
}
fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}
fn default_tick_millis() -> u64 {
    DEFAULT_TICK_MILLIS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ferry/ferry.db", home)
}

impl FerryConfig {
    /// Load config from a TOML file with FERRY_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `FERRY_POOL__CONNECTION_LIFETIME_SECS=1800`. A missing file is not an
    /// error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: FerryConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("FERRY_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ferry/ferry.toml", home)
}
