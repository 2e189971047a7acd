//! `ferry-connect`: live connections to relational backends.
//!
//! The [`Connector`] turns a [`ferry_core::ConnectionDescriptor`] into a
//! pooled [`LiveConnection`]; the [`ConnectionRegistry`] owns those handles
//! by name and hands out shared references to callers.
//!
//! Supported engines: MySQL, PostgreSQL and SQLite, all through `sqlx`.

pub mod connector;
mod decode;
pub mod dialect;
pub mod error;
pub mod live;
pub mod registry;

pub use connector::{test_connection, Connector};
pub use dialect::Dialect;
pub use error::{ConnectError, Result};
pub use live::{LiveConnection, LiveTransaction, PoolLimits, RowStream};
pub use registry::ConnectionRegistry;
