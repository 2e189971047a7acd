//! Copies between two Postgres tables. Needs a reachable server:
//! `TEST_POSTGRES_HOST` / `_PORT` / `_DB` / `_USER` / `_PASSWORD`
//! (defaults: localhost, 5432, postgres, postgres, postgres).

use std::sync::Arc;

use ferry_connect::{ConnectionRegistry, LiveConnection};
use ferry_core::{ConnectionDescriptor, FieldMapping, SqlValue, SyncMode, SyncTaskDescriptor};
use ferry_store::SqliteStore;
use ferry_sync::SyncEngine;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn pg_descriptor(name: &str) -> ConnectionDescriptor {
    let mut d = ConnectionDescriptor::new(name, "postgres", env_or("TEST_POSTGRES_DB", "postgres"));
    d.host = env_or("TEST_POSTGRES_HOST", "localhost");
    d.port = env_or("TEST_POSTGRES_PORT", "5432").parse().unwrap();
    d.username = env_or("TEST_POSTGRES_USER", "postgres");
    d.password = env_or("TEST_POSTGRES_PASSWORD", "postgres");
    d.max_idle = 1;
    d.max_open = 4;
    d
}

fn payments_task(prefix: &str, mode: SyncMode, cursor: &str) -> SyncTaskDescriptor {
    SyncTaskDescriptor {
        id: 0,
        name: "payments".to_string(),
        source_connection: "pg".to_string(),
        source_table: format!("public.{prefix}_src"),
        target_connection: "pg".to_string(),
        target_table: format!("public.{prefix}_dst"),
        field_mapping: FieldMapping::new(),
        sync_mode: mode,
        cursor_field: cursor.to_string(),
        schedule: String::new(),
        enabled: true,
        last_run_at: None,
        last_run_status: None,
        last_run_message: None,
    }
}

async fn exec(conn: &LiveConnection, sql: &str) {
    conn.execute(sql, std::iter::empty()).await.unwrap();
}

const COLUMNS: &str = "id UUID PRIMARY KEY, amount NUMERIC(12,2) NOT NULL, payload JSONB,
    due TIME, grace INTERVAL, origin INET";

/// Fresh `{prefix}_src` and `{prefix}_dst` tables; each test uses its own
/// prefix so tests can run side by side.
async fn setup(prefix: &str) -> (Arc<SqliteStore>, SyncEngine, Arc<LiveConnection>) {
    let registry = Arc::new(ConnectionRegistry::default());
    registry.add("pg", &pg_descriptor("pg")).await.unwrap();
    let pg = registry.get("pg").await.unwrap();
    for table in [format!("{prefix}_src"), format!("{prefix}_dst")] {
        exec(&pg, &format!("DROP TABLE IF EXISTS {table}")).await;
        exec(&pg, &format!("CREATE TABLE {table} ({COLUMNS})")).await;
    }
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = SyncEngine::new(store.clone(), registry);
    (store, engine, pg)
}

#[tokio::test]
#[ignore = "requires a Postgres server (TEST_POSTGRES_*)"]
async fn typed_columns_survive_a_copy() {
    let (store, engine, pg) = setup("ferry_typed").await;
    exec(
        &pg,
        "INSERT INTO ferry_typed_src VALUES
         ('5f0c6f1e-9a3b-4c1d-8e2f-0a1b2c3d4e5f', 1234.50, '{\"k\": [1, 2]}',
          '09:30:00.25', '1 mon 2 days 03:00:00', '10.0.0.1'),
         ('0e7a0c52-1c5d-4a4f-9f51-2d7c3b1a9e00', 7.00, NULL, NULL, NULL, NULL)",
    )
    .await;

    let id = store.create_sync_task(&payments_task("ferry_typed", SyncMode::Full, "")).unwrap();
    assert_eq!(engine.execute_task(id).await.unwrap().rows_affected, 2);

    let rows = pg
        .fetch_all(
            "SELECT id::text AS id, amount::text AS amount, payload::text AS payload,
                    due::text AS due, grace::text AS grace, host(origin) AS origin
             FROM ferry_typed_dst t ORDER BY t.amount DESC",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let text = |s: &str| Some(SqlValue::Text(s.to_string()));
    assert_eq!(rows[0].get("id").cloned(), text("5f0c6f1e-9a3b-4c1d-8e2f-0a1b2c3d4e5f"));
    assert_eq!(rows[0].get("amount").cloned(), text("1234.50"));
    assert_eq!(rows[0].get("payload").cloned(), text("{\"k\": [1, 2]}"));
    assert_eq!(rows[0].get("due").cloned(), text("09:30:00.25"));
    assert_eq!(rows[0].get("grace").cloned(), text("1 mon 2 days 03:00:00"));
    assert_eq!(rows[0].get("origin").cloned(), text("10.0.0.1"));
    assert_eq!(rows[1].get("payload"), Some(&SqlValue::Null));
}

#[tokio::test]
#[ignore = "requires a Postgres server (TEST_POSTGRES_*)"]
async fn numeric_cursor_resumes_incremental_copy() {
    let (store, engine, pg) = setup("ferry_cursor").await;
    exec(
        &pg,
        "INSERT INTO ferry_cursor_src (id, amount) VALUES
         ('5f0c6f1e-9a3b-4c1d-8e2f-0a1b2c3d4e5f', 10.00),
         ('0e7a0c52-1c5d-4a4f-9f51-2d7c3b1a9e00', 20.00)",
    )
    .await;
    let id = store
        .create_sync_task(&payments_task("ferry_cursor", SyncMode::Incremental, "amount"))
        .unwrap();
    assert_eq!(engine.execute_task(id).await.unwrap().rows_affected, 2);

    exec(
        &pg,
        "INSERT INTO ferry_cursor_src (id, amount) VALUES
         ('9b2d4f6a-8c1e-4d3b-a5f7-1e2d3c4b5a69', 20.01)",
    )
    .await;
    assert_eq!(engine.execute_task(id).await.unwrap().rows_affected, 1);
    assert_eq!(engine.execute_task(id).await.unwrap().rows_affected, 0);
}
