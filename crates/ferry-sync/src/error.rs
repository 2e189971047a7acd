use ferry_core::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync task {task_id} not found")]
    NotFound { task_id: TaskId },

    #[error("sync task {task_id} is disabled")]
    TaskDisabled { task_id: TaskId },

    /// Another run of the same task is still in flight.
    #[error("sync task {task_id} is already running")]
    AlreadyRunning { task_id: TaskId },

    #[error("connection '{name}' unavailable: {reason}")]
    ConnectionUnavailable { name: String, reason: String },

    #[error("sync task {task_id} is incremental but has no cursor field")]
    MissingCursorField { task_id: TaskId },

    /// The field mapping sends two source columns to one target column.
    #[error("field mapping writes target column '{column}' more than once")]
    DuplicateTargetColumn { column: String },

    /// The cursor lookup or the source query itself failed.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("failed to read source row: {0}")]
    ScanError(#[source] sqlx::Error),

    /// `row` is 1-based within the run.
    #[error("failed to insert row {row}: {source}")]
    InsertError {
        row: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to commit target transaction: {0}")]
    CommitError(#[source] sqlx::Error),

    #[error("metadata store error: {0}")]
    Store(#[from] ferry_store::StoreError),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NotFound { .. } => "NOT_FOUND",
            SyncError::TaskDisabled { .. } => "TASK_DISABLED",
            SyncError::AlreadyRunning { .. } => "ALREADY_RUNNING",
            SyncError::ConnectionUnavailable { .. } => "CONNECTION_UNAVAILABLE",
            SyncError::MissingCursorField { .. } => "MISSING_CURSOR_FIELD",
            SyncError::DuplicateTargetColumn { .. } => "DUPLICATE_TARGET_COLUMN",
            SyncError::Query(_) => "QUERY_FAILED",
            SyncError::ScanError(_) => "SCAN_ERROR",
            SyncError::InsertError { .. } => "INSERT_ERROR",
            SyncError::CommitError(_) => "COMMIT_ERROR",
            SyncError::Store(_) => "STORE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
