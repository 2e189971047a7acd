use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ferry_core::{SyncTaskDescriptor, TaskId};
use ferry_store::MetadataStore;
use ferry_sync::SyncError;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    executor::TaskExecutor,
    schedule::Schedule,
    types::{ScheduledTask, Trigger},
};

/// Triggers plus the executor they fire into; shared with the dispatcher loop.
struct Shared {
    triggers: RwLock<HashMap<TaskId, Trigger>>,
    executor: Arc<dyn TaskExecutor>,
}

impl Shared {
    async fn fire_due(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let due: Vec<TaskId> = {
            let mut triggers = self.triggers.write().await;
            triggers
                .iter_mut()
                .filter(|(_, trigger)| trigger.is_due(now))
                .map(|(id, trigger)| {
                    trigger.advance(now);
                    debug!(task_id = id, next_run = ?trigger.next_run, "trigger fired");
                    *id
                })
                .collect()
        };
        due.into_iter()
            .map(|task_id| spawn_run(Arc::clone(&self.executor), task_id))
            .collect()
    }
}

struct Dispatcher {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Keeps one trigger per scheduled task and fires them from a background
/// dispatcher.
///
/// Trigger bookkeeping is idempotent: adding an already scheduled task and
/// removing an unscheduled one are both no-ops.
pub struct TaskScheduler {
    shared: Arc<Shared>,
    store: Arc<dyn MetadataStore>,
    tick: Duration,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl TaskScheduler {
    pub fn new(executor: Arc<dyn TaskExecutor>, store: Arc<dyn MetadataStore>, tick: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                triggers: RwLock::new(HashMap::new()),
                executor,
            }),
            store,
            tick,
            dispatcher: Mutex::new(None),
        }
    }

    /// Schedule `task_id`. Returns `false` without touching anything when the
    /// task already has a trigger; `expression` is not even parsed then.
    pub async fn add_task(&self, task_id: TaskId, expression: &str) -> Result<bool> {
        let mut triggers = self.shared.triggers.write().await;
        if triggers.contains_key(&task_id) {
            debug!(task_id, "task already scheduled");
            return Ok(false);
        }
        let schedule = Schedule::parse(expression)?;
        let trigger = Trigger::new(expression, schedule, Utc::now());
        info!(task_id, expression, next_run = ?trigger.next_run, "task scheduled");
        triggers.insert(task_id, trigger);
        Ok(true)
    }

    /// Drop the trigger for `task_id`. Returns whether one existed.
    pub async fn remove_task(&self, task_id: TaskId) -> bool {
        let removed = self.shared.triggers.write().await.remove(&task_id).is_some();
        if removed {
            info!(task_id, "task unscheduled");
        }
        removed
    }

    /// Replace the trigger for `task_id`. If `expression` does not parse the
    /// task is left unscheduled.
    pub async fn update_task(&self, task_id: TaskId, expression: &str) -> Result<()> {
        self.remove_task(task_id).await;
        self.add_task(task_id, expression).await.map(|_| ())
    }

    /// Bring the trigger in line with an edited descriptor.
    pub async fn refresh_task(&self, task: &SyncTaskDescriptor) -> Result<()> {
        if task.is_scheduled() {
            self.update_task(task.id, &task.schedule).await
        } else {
            self.remove_task(task.id).await;
            Ok(())
        }
    }

    /// Schedule every enabled task with a schedule expression. Tasks whose
    /// expression does not parse are logged and skipped.
    pub async fn load_tasks(&self) -> Result<usize> {
        let tasks = self.store.load_sync_task_descriptors(true, true)?;
        let mut added = 0;
        for task in &tasks {
            match self.add_task(task.id, &task.schedule).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(task_id = task.id, code = e.code(), error = %e, "skipping task");
                }
            }
        }
        info!(added, total = tasks.len(), "scheduled tasks loaded");
        Ok(added)
    }

    /// Load scheduled tasks and start the dispatcher.
    ///
    /// The dispatcher starts even when loading fails; the load error is
    /// returned for the caller to report.
    pub async fn start(&self) -> Result<usize> {
        let loaded = self.load_tasks().await;
        let mut dispatcher = self.dispatcher.lock().await;
        if dispatcher.is_some() {
            debug!("dispatcher already running");
            return loaded;
        }
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::clone(&self.shared), self.tick, rx));
        *dispatcher = Some(Dispatcher { shutdown, handle });
        loaded
    }

    /// Stop the dispatcher and wait for it to exit. Firings already spawned
    /// keep running.
    pub async fn stop(&self) {
        let Some(dispatcher) = self.dispatcher.lock().await.take() else {
            return;
        };
        let _ = dispatcher.shutdown.send(true);
        if let Err(e) = dispatcher.handle.await {
            error!("scheduler dispatcher ended abnormally: {e}");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.dispatcher.lock().await.is_some()
    }

    /// Fire every trigger due at `now`, returning the spawned runs.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        self.shared.fire_due(now).await
    }

    /// Run `task_id` once in the background, outside its schedule.
    pub fn execute_now(&self, task_id: TaskId) -> JoinHandle<()> {
        spawn_run(Arc::clone(&self.shared.executor), task_id)
    }

    /// Scheduled tasks ordered by id.
    pub async fn scheduled(&self) -> Vec<ScheduledTask> {
        let triggers = self.shared.triggers.read().await;
        let mut tasks: Vec<ScheduledTask> = triggers
            .iter()
            .map(|(id, t)| ScheduledTask {
                task_id: *id,
                expression: t.expression.clone(),
                next_run: t.next_run,
                fire_count: t.fire_count,
            })
            .collect();
        tasks.sort_by_key(|t| t.task_id);
        tasks
    }

    pub async fn is_scheduled(&self, task_id: TaskId) -> bool {
        self.shared.triggers.read().await.contains_key(&task_id)
    }
}

/// Dispatcher loop. Ticks until `shutdown` broadcasts `true`.
async fn run(shared: Arc<Shared>, tick: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(tick_ms = tick.as_millis() as u64, "scheduler dispatcher started");
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                shared.fire_due(Utc::now()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("scheduler dispatcher shutting down");
                    break;
                }
            }
        }
    }
}

fn spawn_run(executor: Arc<dyn TaskExecutor>, task_id: TaskId) -> JoinHandle<()> {
    tokio::spawn(async move {
        match executor.execute(task_id).await {
            Ok(outcome) => info!(
                task_id,
                run_id = outcome.run_id,
                rows = outcome.rows_affected,
                duration_ms = outcome.duration_ms,
                "sync run finished"
            ),
            Err(SyncError::AlreadyRunning { .. }) => {
                warn!(task_id, "previous run still in flight, skipping")
            }
            Err(e) => error!(task_id, code = e.code(), error = %e, "sync run failed"),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use async_trait::async_trait;
    use ferry_core::{FieldMapping, SyncMode};
    use ferry_store::SqliteStore;
    use ferry_sync::SyncOutcome;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for Counting {
        async fn execute(&self, task_id: TaskId) -> std::result::Result<SyncOutcome, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SyncOutcome {
                task_id,
                run_id: 1,
                rows_affected: 0,
                duration_ms: 0,
            })
        }
    }

    fn scheduler(store: Arc<SqliteStore>) -> (TaskScheduler, Arc<Counting>) {
        let counting = Arc::new(Counting::default());
        let scheduler = TaskScheduler::new(counting.clone(), store, Duration::from_millis(20));
        (scheduler, counting)
    }

    fn descriptor(name: &str, schedule: &str, enabled: bool) -> SyncTaskDescriptor {
        SyncTaskDescriptor {
            id: 0,
            name: name.to_string(),
            source_connection: "src".to_string(),
            source_table: "a".to_string(),
            target_connection: "dst".to_string(),
            target_table: "b".to_string(),
            field_mapping: FieldMapping::new(),
            sync_mode: SyncMode::Full,
            cursor_field: String::new(),
            schedule: schedule.to_string(),
            enabled,
            last_run_at: None,
            last_run_status: None,
            last_run_message: None,
        }
    }

    fn empty_store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn adding_twice_keeps_the_first_trigger() {
        let (s, _) = scheduler(empty_store());
        assert!(s.add_task(1, "@every 1m").await.unwrap());
        assert!(!s.add_task(1, "@hourly").await.unwrap());

        let scheduled = s.scheduled().await;
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].expression, "@every 1m");
    }

    #[tokio::test]
    async fn adding_scheduled_task_ignores_new_expression() {
        let (s, _) = scheduler(empty_store());
        assert!(s.add_task(1, "@hourly").await.unwrap());
        assert!(!s.add_task(1, "not a cron").await.unwrap());
        assert_eq!(s.scheduled().await[0].expression, "@hourly");
    }

    #[tokio::test]
    async fn invalid_expression_adds_nothing() {
        let (s, _) = scheduler(empty_store());
        assert!(s.add_task(1, "every tuesday").await.is_err());
        assert!(!s.is_scheduled(1).await);
    }

    #[tokio::test]
    async fn removing_unknown_task_is_a_no_op() {
        let (s, _) = scheduler(empty_store());
        assert!(!s.remove_task(42).await);
        s.add_task(42, "@daily").await.unwrap();
        assert!(s.remove_task(42).await);
        assert!(s.scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn update_replaces_expression() {
        let (s, _) = scheduler(empty_store());
        s.add_task(1, "@every 1m").await.unwrap();
        s.update_task(1, "*/10 * * * *").await.unwrap();
        assert_eq!(s.scheduled().await[0].expression, "*/10 * * * *");

        // A bad replacement leaves the task unscheduled.
        assert!(s.update_task(1, "bogus").await.is_err());
        assert!(!s.is_scheduled(1).await);
    }

    #[tokio::test]
    async fn updated_trigger_fires_on_the_new_cadence() {
        let (s, counting) = scheduler(empty_store());
        s.add_task(1, "@every 1h").await.unwrap();
        let soon = Utc::now() + chrono::Duration::seconds(2);
        assert!(s.fire_due(soon).await.is_empty());

        s.update_task(1, "@every 1s").await.unwrap();
        for handle in s.fire_due(soon).await {
            handle.await.unwrap();
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        // The hourly cadence is gone: the next firing is a second after
        // `soon`, not an hour after the update.
        let next = s.scheduled().await[0].next_run.unwrap();
        assert_eq!(next, soon + chrono::Duration::seconds(1));
        for handle in s.fire_due(next).await {
            handle.await.unwrap();
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.scheduled().await[0].fire_count, 2);
    }

    #[tokio::test]
    async fn refresh_applies_stored_edits() {
        let store = empty_store();
        let id = store.create_sync_task(&descriptor("t", "@hourly", true)).unwrap();
        let (s, _) = scheduler(store.clone());
        assert_eq!(s.load_tasks().await.unwrap(), 1);

        store.set_task_schedule(id, "*/10 * * * *").unwrap();
        let edited = store.load_sync_task_descriptor(id).unwrap().unwrap();
        s.refresh_task(&edited).await.unwrap();
        assert_eq!(s.scheduled().await[0].expression, "*/10 * * * *");

        store.set_task_enabled(id, false).unwrap();
        let disabled = store.load_sync_task_descriptor(id).unwrap().unwrap();
        s.refresh_task(&disabled).await.unwrap();
        assert!(!s.is_scheduled(id).await);
    }

    #[tokio::test]
    async fn load_tasks_skips_unreadable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let good = store.create_sync_task(&descriptor("good", "@hourly", true)).unwrap();
        let bad = store.create_sync_task(&descriptor("bad", "@hourly", true)).unwrap();
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute("UPDATE sync_tasks SET sync_mode = 'mirror' WHERE id = ?1", [bad])
            .unwrap();

        let (s, _) = scheduler(store);
        assert_eq!(s.load_tasks().await.unwrap(), 1);
        assert!(s.is_scheduled(good).await);
        assert!(!s.is_scheduled(bad).await);
    }

    #[tokio::test]
    async fn refresh_follows_descriptor_state() {
        let (s, _) = scheduler(empty_store());
        let mut task = descriptor("t", "@hourly", true);
        task.id = 3;
        s.refresh_task(&task).await.unwrap();
        assert!(s.is_scheduled(3).await);

        task.enabled = false;
        s.refresh_task(&task).await.unwrap();
        assert!(!s.is_scheduled(3).await);
    }

    #[tokio::test]
    async fn only_due_triggers_fire() {
        let (s, counting) = scheduler(empty_store());
        s.add_task(1, "@every 1s").await.unwrap();
        s.add_task(2, "@every 1h").await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(2);
        for handle in s.fire_due(later).await {
            handle.await.unwrap();
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        // The fired trigger moved past `later`; firing again at the same
        // instant does nothing.
        assert!(s.fire_due(later).await.is_empty());
        let scheduled = s.scheduled().await;
        assert_eq!(scheduled[0].fire_count, 1);
        assert!(scheduled[0].next_run.unwrap() > later);
        assert_eq!(scheduled[1].fire_count, 0);
    }

    #[tokio::test]
    async fn load_tasks_skips_bad_expressions() {
        let store = empty_store();
        let good = store.create_sync_task(&descriptor("good", "@every 5m", true)).unwrap();
        store.create_sync_task(&descriptor("bad", "not a cron", true)).unwrap();
        store.create_sync_task(&descriptor("off", "@hourly", false)).unwrap();
        store.create_sync_task(&descriptor("manual", "", true)).unwrap();

        let (s, _) = scheduler(store);
        assert_eq!(s.load_tasks().await.unwrap(), 1);
        let ids: Vec<TaskId> = s.scheduled().await.iter().map(|t| t.task_id).collect();
        assert_eq!(ids, [good]);

        // Reloading does not duplicate.
        assert_eq!(s.load_tasks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn execute_now_runs_once() {
        let (s, counting) = scheduler(empty_store());
        s.execute_now(9).await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatcher_fires_and_stops() {
        let store = empty_store();
        store.create_sync_task(&descriptor("tick", "@every 1s", true)).unwrap();
        let (s, counting) = scheduler(store);

        assert_eq!(s.start().await.unwrap(), 1);
        assert!(s.is_running().await);
        // Second start is harmless.
        s.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        s.stop().await;
        assert!(!s.is_running().await);
        assert!(counting.calls.load(Ordering::SeqCst) >= 1);

        // Idempotent.
        s.stop().await;
    }
}
