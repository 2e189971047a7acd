use chrono::Utc;
use ferry_core::{
    ConnectionDescriptor, FieldMapping, RunStatus, SyncMode, SyncRunRecord, SyncTaskDescriptor,
    TaskRunState,
};
use ferry_store::{db, MetadataStore, SqliteStore, StoreError};

fn task(name: &str, schedule: &str, enabled: bool) -> SyncTaskDescriptor {
    let mut mapping = FieldMapping::new();
    mapping.insert("zeta".to_string(), "z".to_string());
    mapping.insert("alpha".to_string(), "a".to_string());
    SyncTaskDescriptor {
        id: 0,
        name: name.to_string(),
        source_connection: "src".to_string(),
        source_table: "events".to_string(),
        target_connection: "dst".to_string(),
        target_table: "events_copy".to_string(),
        field_mapping: mapping,
        sync_mode: SyncMode::Incremental,
        cursor_field: "updated_at".to_string(),
        schedule: schedule.to_string(),
        enabled,
        last_run_at: None,
        last_run_status: None,
        last_run_message: None,
    }
}

#[test]
fn migrations_are_idempotent() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    db::init_db(&conn).unwrap();
    db::init_db(&conn).unwrap();
    assert_eq!(db::schema_version(&conn).unwrap(), db::latest_version());

    let applied: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
        .unwrap();
    assert_eq!(applied, db::latest_version() as i64);
}

#[test]
fn task_round_trip_preserves_mapping_order() {
    let store = SqliteStore::open_in_memory().unwrap();
    let id = store.create_sync_task(&task("orders", "@every 1m", true)).unwrap();

    let loaded = store.load_sync_task_descriptor(id).unwrap().unwrap();
    assert_eq!(loaded.name, "orders");
    assert_eq!(loaded.sync_mode, SyncMode::Incremental);
    let keys: Vec<&str> = loaded.field_mapping.keys().map(String::as_str).collect();
    assert_eq!(keys, ["zeta", "alpha"]);
    assert!(loaded.last_run_at.is_none());
}

#[test]
fn missing_task_loads_as_none() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.load_sync_task_descriptor(404).unwrap().is_none());
}

#[test]
fn scheduled_filter_requires_enabled_and_expression() {
    let store = SqliteStore::open_in_memory().unwrap();
    let scheduled = store.create_sync_task(&task("a", "*/5 * * * *", true)).unwrap();
    store.create_sync_task(&task("b", "", true)).unwrap();
    store.create_sync_task(&task("c", "@hourly", false)).unwrap();
    store.create_sync_task(&task("d", "   ", true)).unwrap();

    let tasks = store.load_sync_task_descriptors(true, true).unwrap();
    let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, [scheduled]);

    let unscheduled = store.load_sync_task_descriptors(true, false).unwrap();
    assert_eq!(unscheduled.len(), 2);
}

#[test]
fn finalized_run_record_is_immutable() {
    let store = SqliteStore::open_in_memory().unwrap();
    let task_id = store.create_sync_task(&task("a", "", true)).unwrap();

    let mut record = SyncRunRecord::running(task_id, Utc::now());
    record.id = store.save_run_record(&record).unwrap();
    record.succeed(42, 17);
    store.finalize_run_record(&record).unwrap();

    // A second finalize must not overwrite the first outcome.
    let mut again = record.clone();
    again.fail("late failure", 99);
    store.finalize_run_record(&again).unwrap();

    let runs = store.list_run_records(task_id, 10, 0).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].rows_affected, 42);
    assert_eq!(runs[0].duration_ms, 17);
    assert!(runs[0].error_detail.is_none());
}

#[test]
fn run_records_list_newest_first() {
    let store = SqliteStore::open_in_memory().unwrap();
    let task_id = store.create_sync_task(&task("a", "", true)).unwrap();
    let base = Utc::now();
    for i in 0..3 {
        let record = SyncRunRecord::running(task_id, base + chrono::Duration::seconds(i));
        store.save_run_record(&record).unwrap();
    }

    let runs = store.list_run_records(task_id, 2, 0).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].created_at > runs[1].created_at);
    assert_eq!(store.list_run_records(task_id, 10, 2).unwrap().len(), 1);
}

#[test]
fn run_state_update_keeps_unset_columns() {
    let store = SqliteStore::open_in_memory().unwrap();
    let id = store.create_sync_task(&task("a", "", true)).unwrap();
    let started = Utc::now();

    store
        .update_task_run_state(id, &TaskRunState::started(started))
        .unwrap();
    store
        .update_task_run_state(id, &TaskRunState::finished(RunStatus::Success, "synced 3 rows"))
        .unwrap();

    let loaded = store.load_sync_task_descriptor(id).unwrap().unwrap();
    assert_eq!(loaded.last_run_status, Some(RunStatus::Success));
    assert_eq!(loaded.last_run_message.as_deref(), Some("synced 3 rows"));
    assert_eq!(
        loaded.last_run_at.map(|t| t.timestamp()),
        Some(started.timestamp())
    );
}

#[test]
fn run_state_update_on_unknown_task_is_not_found() {
    let store = SqliteStore::open_in_memory().unwrap();
    let err = store
        .update_task_run_state(9, &TaskRunState::started(Utc::now()))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { id: 9, .. }));
}

#[test]
fn connection_descriptors_round_trip() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut d = ConnectionDescriptor::new("warehouse", "postgres", "dw");
    d.host = "db.internal".to_string();
    d.port = 5432;
    d.password = "s3cret".to_string();
    d.enabled = false;
    store.create_connection(&d).unwrap();

    let loaded = store.load_connection_descriptors().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "warehouse");
    assert_eq!(loaded[0].port, 5432);
    assert_eq!(loaded[0].password, "s3cret");
    assert!(!loaded[0].enabled);
}

#[test]
fn duplicate_connection_name_is_rejected() {
    let store = SqliteStore::open_in_memory().unwrap();
    let d = ConnectionDescriptor::new("warehouse", "postgres", "dw");
    store.create_connection(&d).unwrap();
    assert!(matches!(
        store.create_connection(&d),
        Err(StoreError::Database(_))
    ));
}

#[test]
fn unreadable_rows_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.db");
    let store = SqliteStore::open(&path).unwrap();
    let good = store.create_sync_task(&task("good", "@hourly", true)).unwrap();
    let mirror = store.create_sync_task(&task("mirror", "@hourly", true)).unwrap();
    let broken_json = store.create_sync_task(&task("json", "@hourly", true)).unwrap();
    store
        .create_connection(&ConnectionDescriptor::new("ok", "sqlite", "a.db"))
        .unwrap();
    store
        .create_connection(&ConnectionDescriptor::new("wide", "mysql", "b"))
        .unwrap();

    // Damage rows behind the store's back.
    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute("UPDATE sync_tasks SET sync_mode = 'mirror' WHERE id = ?1", [mirror])
        .unwrap();
    raw.execute("UPDATE sync_tasks SET field_mapping = '{oops' WHERE id = ?1", [broken_json])
        .unwrap();
    raw.execute("UPDATE connections SET port = 70000 WHERE name = 'wide'", [])
        .unwrap();

    let tasks = store.load_sync_task_descriptors(true, true).unwrap();
    let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, [good]);

    let connections = store.load_connection_descriptors().unwrap();
    let names: Vec<&str> = connections.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["ok"]);
}

#[test]
fn task_edits_update_enabled_and_schedule() {
    let store = SqliteStore::open_in_memory().unwrap();
    let id = store.create_sync_task(&task("a", "@hourly", true)).unwrap();

    store.set_task_schedule(id, "*/5 * * * *").unwrap();
    store.set_task_enabled(id, false).unwrap();
    let loaded = store.load_sync_task_descriptor(id).unwrap().unwrap();
    assert_eq!(loaded.schedule, "*/5 * * * *");
    assert!(!loaded.enabled);
    assert!(store.load_sync_task_descriptors(true, true).unwrap().is_empty());

    assert!(matches!(
        store.set_task_enabled(404, true),
        Err(StoreError::NotFound { id: 404, .. })
    ));
}
