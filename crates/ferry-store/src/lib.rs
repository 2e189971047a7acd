//! `ferry-store`: the metadata store the sync core reads descriptors from
//! and writes run outcomes to.
//!
//! [`MetadataStore`] is the seam the core depends on; [`SqliteStore`] is the
//! bundled implementation, backed by a single SQLite file with versioned
//! migrations applied on open.

pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use store::MetadataStore;
