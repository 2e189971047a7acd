use async_trait::async_trait;
use ferry_core::TaskId;
use ferry_sync::{SyncEngine, SyncError, SyncOutcome};

/// Runs one sync task when its trigger fires.
///
/// Implementations must be `Send + Sync`: every firing runs on its own Tokio
/// task and they may overlap.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task_id: TaskId) -> Result<SyncOutcome, SyncError>;
}

#[async_trait]
impl TaskExecutor for SyncEngine {
    async fn execute(&self, task_id: TaskId) -> Result<SyncOutcome, SyncError> {
        self.execute_task(task_id).await
    }
}
