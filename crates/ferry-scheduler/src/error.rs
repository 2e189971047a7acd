use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The schedule expression is empty, malformed or never fires.
    #[error("invalid schedule '{expression}': {reason}")]
    ScheduleParse { expression: String, reason: String },

    /// Loading task descriptors from the metadata store failed.
    #[error("metadata store error: {0}")]
    Store(#[from] ferry_store::StoreError),
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::ScheduleParse { .. } => "SCHEDULE_PARSE_ERROR",
            SchedulerError::Store(_) => "STORE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
