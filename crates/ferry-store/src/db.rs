use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Result, StoreError};

/// Ordered, append-only list of schema migrations. Never edit a shipped entry;
/// add a new version instead.
const MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "create_connections",
        "CREATE TABLE connections (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL UNIQUE,
            engine      TEXT    NOT NULL,
            host        TEXT    NOT NULL DEFAULT '',
            port        INTEGER NOT NULL DEFAULT 0,
            database    TEXT    NOT NULL,
            username    TEXT    NOT NULL DEFAULT '',
            password    TEXT    NOT NULL DEFAULT '',
            charset     TEXT    NOT NULL DEFAULT 'utf8mb4',
            max_idle    INTEGER NOT NULL DEFAULT 10,
            max_open    INTEGER NOT NULL DEFAULT 100,
            enabled     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        );",
    ),
    (
        2,
        "create_sync_tasks",
        "CREATE TABLE sync_tasks (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            name              TEXT    NOT NULL,
            source_connection TEXT    NOT NULL,
            source_table      TEXT    NOT NULL,
            target_connection TEXT    NOT NULL,
            target_table      TEXT    NOT NULL,
            field_mapping     TEXT    NOT NULL DEFAULT '{}',  -- JSON object, insertion ordered
            sync_mode         TEXT    NOT NULL,
            cursor_field      TEXT    NOT NULL DEFAULT '',
            schedule          TEXT    NOT NULL DEFAULT '',
            enabled           INTEGER NOT NULL DEFAULT 1,
            last_run_at       TEXT,
            last_run_status   TEXT,
            last_run_message  TEXT,
            created_at        TEXT    NOT NULL,
            updated_at        TEXT    NOT NULL
        );
        CREATE INDEX idx_sync_tasks_scheduled ON sync_tasks (enabled, schedule);",
    ),
    (
        3,
        "create_sync_runs",
        "CREATE TABLE sync_runs (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id       INTEGER NOT NULL,
            status        TEXT    NOT NULL,
            rows_affected INTEGER NOT NULL DEFAULT 0,
            duration_ms   INTEGER NOT NULL DEFAULT 0,
            message       TEXT    NOT NULL DEFAULT '',
            error_detail  TEXT,
            created_at    TEXT    NOT NULL
        );
        CREATE INDEX idx_sync_runs_task ON sync_runs (task_id, created_at DESC);",
    ),
];

/// Bring the schema in `conn` up to the latest version.
///
/// Safe to call on every startup: applied versions are tracked in
/// `schema_migrations` and each pending migration runs in its own transaction.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current = schema_version(conn)?;
    for &(version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql).map_err(|e| StoreError::Migration {
            version,
            name,
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![version, name, chrono::Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        info!(version, name, "applied metadata migration");
    }
    Ok(())
}

/// Highest applied migration version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Latest version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |(v, _, _)| *v)
}
