//! `ferry-sync`: copies rows between two registered connections.
//!
//! [`SyncEngine::execute_task`] runs one task end to end: it records the run,
//! streams source rows into a single target transaction and writes the
//! outcome back to the metadata store. A run either commits every row or
//! none of them.

pub mod engine;
pub mod error;
pub mod mapping;
pub mod query;

pub use engine::{SyncEngine, SyncOutcome};
pub use error::{Result, SyncError};
