use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Primary key of a sync task in the metadata store.
pub type TaskId = i64;

/// Ordered source-column → target-column renames. Keys are unique.
pub type FieldMapping = IndexMap<String, String>;

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Relational backends the connector knows how to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    MySql,
    Postgres,
    Sqlite,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineKind::MySql => "mysql",
            EngineKind::Postgres => "postgres",
            EngineKind::Sqlite => "sqlite",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(EngineKind::MySql),
            "postgres" | "postgresql" | "pg" => Ok(EngineKind::Postgres),
            "sqlite" | "sqlite3" => Ok(EngineKind::Sqlite),
            other => Err(format!("unsupported engine: {other}")),
        }
    }
}

/// Persisted description of one backend connection.
///
/// `engine` stays a raw string: descriptors are free-form and only the
/// connector decides whether the engine is one it can open. For SQLite,
/// `database` is the file path and the network fields are ignored.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub engine: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_max_idle")]
    pub max_idle: u32,
    #[serde(default = "default_max_open")]
    pub max_open: u32,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl ConnectionDescriptor {
    /// Descriptor with default pool limits; handy for tests and seeding.
    pub fn new(name: impl Into<String>, engine: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            engine: engine.into(),
            host: String::new(),
            port: 0,
            database: database.into(),
            username: String::new(),
            password: String::new(),
            charset: default_charset(),
            max_idle: default_max_idle(),
            max_open: default_max_open(),
            enabled: true,
        }
    }
}

// Password never reaches logs.
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("charset", &self.charset)
            .field("max_idle", &self.max_idle)
            .field("max_open", &self.max_open)
            .field("enabled", &self.enabled)
            .finish()
    }
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}
fn default_max_idle() -> u32 {
    10
}
fn default_max_open() -> u32 {
    100
}
fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Sync tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Copy every source row.
    Full,
    /// Copy only source rows whose cursor column exceeds the target's maximum.
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(format!("unknown sync mode: {other}")),
        }
    }
}

/// Outcome state of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A recurring or on-demand copy job between two registered connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTaskDescriptor {
    #[serde(default)]
    pub id: TaskId,
    pub name: String,
    pub source_connection: String,
    pub source_table: String,
    pub target_connection: String,
    pub target_table: String,
    #[serde(default)]
    pub field_mapping: FieldMapping,
    pub sync_mode: SyncMode,
    /// Required when `sync_mode` is incremental (e.g. `updated_at`, `id`).
    #[serde(default)]
    pub cursor_field: String,
    /// Cron-style expression; empty means the task is never scheduled.
    #[serde(default)]
    pub schedule: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_status: Option<RunStatus>,
    #[serde(default)]
    pub last_run_message: Option<String>,
}

impl SyncTaskDescriptor {
    /// True when the scheduler should hold a trigger for this task.
    pub fn is_scheduled(&self) -> bool {
        self.enabled && !self.schedule.trim().is_empty()
    }
}

/// Append-only audit entry for one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunRecord {
    pub id: i64,
    pub task_id: TaskId,
    pub status: RunStatus,
    pub rows_affected: u64,
    pub duration_ms: u64,
    pub message: String,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncRunRecord {
    /// Fresh record written when a run starts.
    pub fn running(task_id: TaskId, started_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            task_id,
            status: RunStatus::Running,
            rows_affected: 0,
            duration_ms: 0,
            message: "sync running".to_string(),
            error_detail: None,
            created_at: started_at,
        }
    }

    pub fn succeed(&mut self, rows_affected: u64, duration_ms: u64) {
        self.status = RunStatus::Success;
        self.rows_affected = rows_affected;
        self.duration_ms = duration_ms;
        self.message = format!("synced {rows_affected} rows");
        self.error_detail = None;
    }

    /// A failed run never reports copied rows: the transaction was rolled back.
    pub fn fail(&mut self, error_detail: impl Into<String>, duration_ms: u64) {
        self.status = RunStatus::Failed;
        self.rows_affected = 0;
        self.duration_ms = duration_ms;
        self.message = "sync failed".to_string();
        self.error_detail = Some(error_detail.into());
    }
}

/// Partial update of a task's last-run columns. `None` leaves a column as is.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRunState {
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: RunStatus,
    pub last_run_message: Option<String>,
}

impl TaskRunState {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            last_run_at: Some(at),
            last_run_status: RunStatus::Running,
            last_run_message: None,
        }
    }

    pub fn finished(status: RunStatus, message: impl Into<String>) -> Self {
        Self {
            last_run_at: None,
            last_run_status: status,
            last_run_message: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Row payloads
// ---------------------------------------------------------------------------

/// A single column value as it travels between backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Integer(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Binary(_) => "binary",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row: column names in select order paired with their values.
///
/// The column list is shared between every row of a result set so it is
/// resolved once per query, not once per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Panics if `columns` and `values` differ in length.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "row column/value count mismatch"
        );
        Self { columns, values }
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
