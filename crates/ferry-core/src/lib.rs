//! `ferry-core`: shared types, configuration and errors for the ferry workspace.
//!
//! Everything that crosses a crate boundary lives here: connection and task
//! descriptors, run records, and the [`SqlValue`]/[`Row`] pair used to move
//! data between backends.

pub mod config;
pub mod error;
pub mod types;

pub use config::FerryConfig;
pub use error::{CoreError, Result};
pub use types::{
    ConnectionDescriptor, EngineKind, FieldMapping, Row, RunStatus, SqlValue, SyncMode,
    SyncRunRecord, SyncTaskDescriptor, TaskId, TaskRunState,
};
