use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("migration {version} ({name}) failed: {reason}")]
    Migration {
        version: u32,
        name: &'static str,
        reason: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "STORE_DATABASE_ERROR",
            StoreError::Serialization(_) => "STORE_SERIALIZATION_ERROR",
            StoreError::Migration { .. } => "STORE_MIGRATION_ERROR",
            StoreError::NotFound { .. } => "NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
