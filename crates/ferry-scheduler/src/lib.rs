//! `ferry-scheduler`: fires sync tasks on their schedules.
//!
//! # Overview
//!
//! [`TaskScheduler`] keeps one in-memory trigger per scheduled task. A
//! dispatcher loop checks the triggers on a fixed tick, advances every due
//! trigger and spawns each firing as its own Tokio task, so a slow sync never
//! delays the others. Firings go through the [`TaskExecutor`] seam, which
//! [`ferry_sync::SyncEngine`] implements.
//!
//! # Schedule expressions
//!
//! | Form                    | Example            |
//! |-------------------------|--------------------|
//! | 5-field cron            | `*/5 * * * *`      |
//! | 6/7-field cron (seconds)| `0 30 9 * * Mon-Fri` |
//! | Shortcut                | `@hourly`, `@daily` |
//! | Fixed interval          | `@every 1h30m`     |

pub mod engine;
pub mod error;
pub mod executor;
pub mod schedule;
pub mod types;

pub use engine::TaskScheduler;
pub use error::{Result, SchedulerError};
pub use executor::TaskExecutor;
pub use schedule::Schedule;
pub use types::ScheduledTask;
