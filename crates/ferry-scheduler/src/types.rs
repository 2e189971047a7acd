use chrono::{DateTime, Utc};
use ferry_core::TaskId;

use crate::schedule::Schedule;

/// Live trigger for one scheduled task.
#[derive(Debug, Clone)]
pub(crate) struct Trigger {
    pub expression: String,
    pub schedule: Schedule,
    /// `None` once the schedule has no future occurrence.
    pub next_run: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

impl Trigger {
    pub fn new(expression: &str, schedule: Schedule, now: DateTime<Utc>) -> Self {
        let next_run = schedule.next_after(now);
        Self {
            expression: expression.to_string(),
            schedule,
            next_run,
            fire_count: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_some_and(|at| at <= now)
    }

    /// Record a firing at `now` and move `next_run` past it.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.fire_count += 1;
        self.next_run = self.schedule.next_after(now);
    }
}

/// Point-in-time view of a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub task_id: TaskId,
    pub expression: String,
    pub next_run: Option<DateTime<Utc>>,
    pub fire_count: u64,
}
