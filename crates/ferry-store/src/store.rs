use ferry_core::{ConnectionDescriptor, SyncRunRecord, SyncTaskDescriptor, TaskId, TaskRunState};

use crate::error::Result;

/// Persistence the sync core consumes.
///
/// The core never creates or edits descriptors; it only reads them and
/// writes run outcomes back. Implementations must be safe to share across
/// tasks (`Send + Sync`); calls are short and synchronous.
pub trait MetadataStore: Send + Sync {
    /// Every persisted connection descriptor, enabled or not.
    fn load_connection_descriptors(&self) -> Result<Vec<ConnectionDescriptor>>;

    fn load_sync_task_descriptor(&self, id: TaskId) -> Result<Option<SyncTaskDescriptor>>;

    /// Tasks matching `enabled`, further filtered on whether their schedule
    /// expression is non-empty (`has_schedule`).
    fn load_sync_task_descriptors(
        &self,
        enabled: bool,
        has_schedule: bool,
    ) -> Result<Vec<SyncTaskDescriptor>>;

    /// Insert a new run record and return its id.
    fn save_run_record(&self, record: &SyncRunRecord) -> Result<i64>;

    /// Write the final outcome of a running record. A record that is already
    /// finalized is left untouched.
    fn finalize_run_record(&self, record: &SyncRunRecord) -> Result<()>;

    fn update_task_run_state(&self, id: TaskId, state: &TaskRunState) -> Result<()>;
}
