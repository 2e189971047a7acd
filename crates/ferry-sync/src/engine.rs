use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashSet;
use ferry_connect::{ConnectionRegistry, LiveConnection, LiveTransaction};
use ferry_core::{
    RunStatus, SqlValue, SyncMode, SyncRunRecord, SyncTaskDescriptor, TaskId, TaskRunState,
};
use ferry_store::MetadataStore;
use futures_util::StreamExt;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::mapping::{map_columns, target_column};
use crate::query::{bound_values, select_all, select_max, select_since, InsertPlan};

/// Result of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub task_id: TaskId,
    pub run_id: i64,
    pub rows_affected: u64,
    pub duration_ms: u64,
}

/// Executes sync tasks against connections held by a [`ConnectionRegistry`].
///
/// Cheap to share behind an `Arc`; any number of different tasks may run at
/// once, but a second run of a task that is still in flight is rejected.
pub struct SyncEngine {
    store: Arc<dyn MetadataStore>,
    registry: Arc<ConnectionRegistry>,
    running: DashSet<TaskId>,
}

/// Marks a task as in flight until dropped.
struct RunGuard<'a> {
    running: &'a DashSet<TaskId>,
    task_id: TaskId,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a DashSet<TaskId>, task_id: TaskId) -> Option<Self> {
        running.insert(task_id).then(|| Self { running, task_id })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.task_id);
    }
}

impl SyncEngine {
    pub fn new(store: Arc<dyn MetadataStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            running: DashSet::new(),
        }
    }

    pub fn is_running(&self, task_id: TaskId) -> bool {
        self.running.contains(&task_id)
    }

    /// Run `task_id` once.
    ///
    /// Lookup failures and [`SyncError::AlreadyRunning`] return before any
    /// run record is written. Every later failure rolls the target back and
    /// finalizes the record as failed before the error is returned.
    #[instrument(skip(self))]
    pub async fn execute_task(&self, task_id: TaskId) -> Result<SyncOutcome> {
        let task = self
            .store
            .load_sync_task_descriptor(task_id)?
            .ok_or(SyncError::NotFound { task_id })?;
        if !task.enabled {
            return Err(SyncError::TaskDisabled { task_id });
        }
        let _guard = RunGuard::acquire(&self.running, task_id)
            .ok_or(SyncError::AlreadyRunning { task_id })?;

        let clock = Instant::now();
        let started_at = Utc::now();
        let mut record = SyncRunRecord::running(task_id, started_at);
        record.id = self.store.save_run_record(&record)?;
        if let Err(e) = self
            .store
            .update_task_run_state(task_id, &TaskRunState::started(started_at))
        {
            warn!(error = %e, "failed to mark task as running");
        }
        info!(run_id = record.id, mode = %task.sync_mode, "sync started");

        let result = self.copy(&task).await;
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(rows) => {
                record.succeed(rows, duration_ms);
                self.finalize(&record, TaskRunState::finished(RunStatus::Success, &record.message));
                info!(run_id = record.id, rows, duration_ms, "sync finished");
                Ok(SyncOutcome {
                    task_id,
                    run_id: record.id,
                    rows_affected: rows,
                    duration_ms,
                })
            }
            Err(e) => {
                let detail = e.to_string();
                record.fail(&detail, duration_ms);
                self.finalize(&record, TaskRunState::finished(RunStatus::Failed, detail));
                error!(run_id = record.id, code = e.code(), error = %e, duration_ms, "sync failed");
                Err(e)
            }
        }
    }

    /// Outcome writes never mask the sync result; failures are only logged.
    fn finalize(&self, record: &SyncRunRecord, state: TaskRunState) {
        if let Err(e) = self.store.finalize_run_record(record) {
            warn!(run_id = record.id, error = %e, "failed to finalize run record");
        }
        if let Err(e) = self.store.update_task_run_state(record.task_id, &state) {
            warn!(task_id = record.task_id, error = %e, "failed to update task run state");
        }
    }

    async fn copy(&self, task: &SyncTaskDescriptor) -> Result<u64> {
        let source = self.connection(&task.source_connection).await?;
        let target = self.connection(&task.target_connection).await?;
        let (sql, params) = source_query(task, &source, &target).await?;
        let column_types = target
            .column_types(&task.target_table)
            .await
            .map_err(SyncError::Query)?;

        let mut tx = target
            .begin()
            .await
            .map_err(|e| SyncError::ConnectionUnavailable {
                name: task.target_connection.clone(),
                reason: e.to_string(),
            })?;

        let copied = stream_into(&mut tx, &source, &target, task, &column_types, &sql, &params).await;
        match copied {
            Ok(rows) => {
                tx.commit().await.map_err(SyncError::CommitError)?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn connection(&self, name: &str) -> Result<Arc<LiveConnection>> {
        self.registry
            .get(name)
            .await
            .map_err(|e| SyncError::ConnectionUnavailable {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Source select plus its bound parameters.
///
/// Incremental runs resume from the target's current maximum cursor value;
/// an empty target copies everything.
async fn source_query(
    task: &SyncTaskDescriptor,
    source: &LiveConnection,
    target: &LiveConnection,
) -> Result<(String, Vec<SqlValue>)> {
    match task.sync_mode {
        SyncMode::Full => Ok((select_all(source.kind(), &task.source_table), Vec::new())),
        SyncMode::Incremental => {
            let cursor = task.cursor_field.trim();
            if cursor.is_empty() {
                return Err(SyncError::MissingCursorField { task_id: task.id });
            }
            let target_cursor = target_column(cursor, &task.field_mapping);
            let max = target
                .fetch_scalar(&select_max(target.kind(), &task.target_table, target_cursor))
                .await
                .map_err(SyncError::Query)?;
            if max.is_null() {
                return Ok((select_all(source.kind(), &task.source_table), Vec::new()));
            }
            let source_types = source
                .column_types(&task.source_table)
                .await
                .map_err(SyncError::Query)?;
            let sql = select_since(
                source.kind(),
                &task.source_table,
                cursor,
                source_types.get(cursor).map(String::as_str),
            );
            Ok((sql, vec![max]))
        }
    }
}

/// Copy every source row into `tx`, returning the number inserted.
async fn stream_into(
    tx: &mut LiveTransaction,
    source: &LiveConnection,
    target: &LiveConnection,
    task: &SyncTaskDescriptor,
    column_types: &HashMap<String, String>,
    sql: &str,
    params: &[SqlValue],
) -> Result<u64> {
    let mut rows = source.fetch(sql, params);
    // An error before the first row means the select itself failed.
    let Some(first) = rows.next().await.transpose().map_err(SyncError::Query)? else {
        return Ok(0);
    };
    let columns = map_columns(first.columns(), &task.field_mapping)?;
    let insert = InsertPlan::new(target.kind(), &task.target_table, &columns, column_types);

    let mut copied: u64 = 0;
    let mut next = Some(first);
    while let Some(row) = next {
        let statement = insert.statement(row.values());
        tx.execute(&statement, bound_values(row.values()))
            .await
            .map_err(|source| SyncError::InsertError {
                row: copied + 1,
                source,
            })?;
        copied += 1;
        next = rows.next().await.transpose().map_err(SyncError::ScanError)?;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_guard_rejects_overlap_and_releases_on_drop() {
        let running = DashSet::new();
        let first = RunGuard::acquire(&running, 7).expect("first run");
        assert!(RunGuard::acquire(&running, 7).is_none());
        assert!(RunGuard::acquire(&running, 8).is_some());
        drop(first);
        assert!(RunGuard::acquire(&running, 7).is_some());
        assert!(running.is_empty());
    }
}
