use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ferry_core::{
    ConnectionDescriptor, FieldMapping, RunStatus, SyncMode, SyncRunRecord, SyncTaskDescriptor,
    TaskId, TaskRunState,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::store::MetadataStore;

const TASK_COLUMNS: &str = "id, name, source_connection, source_table, target_connection,
    target_table, field_mapping, sync_mode, cursor_field, schedule, enabled,
    last_run_at, last_run_status, last_run_message";

const CONNECTION_COLUMNS: &str = "id, name, engine, host, port, database, username, password,
    charset, max_idle, max_open, enabled";

const RUN_COLUMNS: &str =
    "id, task_id, status, rows_affected, duration_ms, message, error_detail, created_at";

/// [`MetadataStore`] backed by one SQLite connection.
///
/// Thread-safe: the connection sits behind a `Mutex`. Every call is a short
/// statement or two, so a single connection is enough for the scheduler and
/// the CLI to share.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, applying pending migrations first.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic elsewhere cannot leave a half-applied statement behind.
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist a new connection descriptor and return its id.
    pub fn create_connection(&self, d: &ConnectionDescriptor) -> Result<i64> {
        let db = self.conn();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO connections
             (name, engine, host, port, database, username, password, charset,
              max_idle, max_open, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            rusqlite::params![
                d.name, d.engine, d.host, d.port, d.database, d.username, d.password,
                d.charset, d.max_idle, d.max_open, d.enabled, now
            ],
        )?;
        let id = db.last_insert_rowid();
        info!(connection = %d.name, id, "connection descriptor created");
        Ok(id)
    }

    /// Persist a new sync task and return its id.
    pub fn create_sync_task(&self, t: &SyncTaskDescriptor) -> Result<TaskId> {
        let mapping = serde_json::to_string(&t.field_mapping)?;
        let db = self.conn();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO sync_tasks
             (name, source_connection, source_table, target_connection, target_table,
              field_mapping, sync_mode, cursor_field, schedule, enabled,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            rusqlite::params![
                t.name,
                t.source_connection,
                t.source_table,
                t.target_connection,
                t.target_table,
                mapping,
                t.sync_mode.to_string(),
                t.cursor_field,
                t.schedule,
                t.enabled,
                now
            ],
        )?;
        let id = db.last_insert_rowid();
        info!(task_id = id, name = %t.name, "sync task created");
        Ok(id)
    }

    pub fn set_task_enabled(&self, id: TaskId, enabled: bool) -> Result<()> {
        self.update_task_column(id, "enabled", &enabled)
    }

    pub fn set_task_schedule(&self, id: TaskId, schedule: &str) -> Result<()> {
        self.update_task_column(id, "schedule", &schedule)
    }

    fn update_task_column(&self, id: TaskId, column: &str, value: &dyn rusqlite::ToSql) -> Result<()> {
        let db = self.conn();
        let n = db.execute(
            &format!("UPDATE sync_tasks SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
            rusqlite::params![value, Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "sync task",
                id,
            });
        }
        Ok(())
    }

    /// Run history for one task, newest first.
    pub fn list_run_records(
        &self,
        task_id: TaskId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SyncRunRecord>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM sync_runs
             WHERE task_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![task_id, limit as i64, offset as i64],
            row_to_run,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl MetadataStore for SqliteStore {
    fn load_connection_descriptors(&self) -> Result<Vec<ConnectionDescriptor>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_connection)?;
        decoded_rows(rows, "connection")
    }

    fn load_sync_task_descriptor(&self, id: TaskId) -> Result<Option<SyncTaskDescriptor>> {
        let db = self.conn();
        let task = db
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM sync_tasks WHERE id = ?1"),
                [id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn load_sync_task_descriptors(
        &self,
        enabled: bool,
        has_schedule: bool,
    ) -> Result<Vec<SyncTaskDescriptor>> {
        let schedule_filter = if has_schedule {
            "TRIM(schedule) != ''"
        } else {
            "TRIM(schedule) = ''"
        };
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks
             WHERE enabled = ?1 AND {schedule_filter}
             ORDER BY id"
        ))?;
        let rows = stmt.query_map([enabled], row_to_task)?;
        let tasks = decoded_rows(rows, "sync task")?;
        debug!(count = tasks.len(), enabled, has_schedule, "loaded sync tasks");
        Ok(tasks)
    }

    fn save_run_record(&self, r: &SyncRunRecord) -> Result<i64> {
        let db = self.conn();
        db.execute(
            "INSERT INTO sync_runs
             (task_id, status, rows_affected, duration_ms, message, error_detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                r.task_id,
                r.status.to_string(),
                r.rows_affected as i64,
                r.duration_ms as i64,
                r.message,
                r.error_detail,
                r.created_at.to_rfc3339()
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    fn finalize_run_record(&self, r: &SyncRunRecord) -> Result<()> {
        let db = self.conn();
        let n = db.execute(
            "UPDATE sync_runs
             SET status = ?1, rows_affected = ?2, duration_ms = ?3, message = ?4, error_detail = ?5
             WHERE id = ?6 AND status = 'running'",
            rusqlite::params![
                r.status.to_string(),
                r.rows_affected as i64,
                r.duration_ms as i64,
                r.message,
                r.error_detail,
                r.id
            ],
        )?;
        if n == 0 {
            debug!(run_id = r.id, "run record already finalized or missing");
        }
        Ok(())
    }

    fn update_task_run_state(&self, id: TaskId, state: &TaskRunState) -> Result<()> {
        let db = self.conn();
        let n = db.execute(
            "UPDATE sync_tasks
             SET last_run_at      = COALESCE(?1, last_run_at),
                 last_run_status  = ?2,
                 last_run_message = COALESCE(?3, last_run_message),
                 updated_at       = ?4
             WHERE id = ?5",
            rusqlite::params![
                state.last_run_at.map(|t| t.to_rfc3339()),
                state.last_run_status.to_string(),
                state.last_run_message,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "sync task",
                id,
            });
        }
        Ok(())
    }
}

// --- row mappers -------------------------------------------------------------

/// Collect the rows that decode. A row with an unreadable column (unknown
/// sync mode, malformed mapping JSON) is logged and dropped so one bad entry
/// cannot hide the rest; statement failures still propagate.
fn decoded_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    entity: &'static str,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(item) => out.push(item),
            Err(
                e @ (rusqlite::Error::FromSqlConversionFailure(..)
                | rusqlite::Error::InvalidColumnType(..)
                | rusqlite::Error::IntegralValueOutOfRange(..)),
            ) => warn!(entity, error = %e, "skipping unreadable row"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_time(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionDescriptor> {
    Ok(ConnectionDescriptor {
        id: row.get(0)?,
        name: row.get(1)?,
        engine: row.get(2)?,
        host: row.get(3)?,
        port: row.get(4)?,
        database: row.get(5)?,
        username: row.get(6)?,
        password: row.get(7)?,
        charset: row.get(8)?,
        max_idle: row.get(9)?,
        max_open: row.get(10)?,
        enabled: row.get(11)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncTaskDescriptor> {
    let mapping_json: String = row.get(6)?;
    let field_mapping: FieldMapping =
        serde_json::from_str(&mapping_json).map_err(|e| conversion_error(6, e))?;
    let mode_str: String = row.get(7)?;
    let sync_mode: SyncMode = mode_str.parse().map_err(|e: String| conversion_error(7, e))?;
    let status: Option<String> = row.get(12)?;
    let last_run_status = status
        .map(|s| s.parse::<RunStatus>())
        .transpose()
        .map_err(|e| conversion_error(12, e))?;

    Ok(SyncTaskDescriptor {
        id: row.get(0)?,
        name: row.get(1)?,
        source_connection: row.get(2)?,
        source_table: row.get(3)?,
        target_connection: row.get(4)?,
        target_table: row.get(5)?,
        field_mapping,
        sync_mode,
        cursor_field: row.get(8)?,
        schedule: row.get(9)?,
        enabled: row.get(10)?,
        last_run_at: parse_time(11, row.get(11)?)?,
        last_run_status,
        last_run_message: row.get(13)?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRunRecord> {
    let status: String = row.get(2)?;
    let created_at: String = row.get(7)?;
    Ok(SyncRunRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        status: status.parse().map_err(|e: String| conversion_error(2, e))?,
        rows_affected: row.get::<_, i64>(3)?.max(0) as u64,
        duration_ms: row.get::<_, i64>(4)?.max(0) as u64,
        message: row.get(5)?,
        error_detail: row.get(6)?,
        created_at: parse_time(7, Some(created_at))?.unwrap_or_else(Utc::now),
    })
}
