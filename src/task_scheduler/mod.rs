//! One-shot task scheduling.
//!
//! A task is identified by name and armed to fire once after a delay.
//! Re-arming replaces the previous due time. The [`TickRunner`] drives armed
//! tasks to completion.

mod in_memory;
mod runner;

pub use in_memory::InMemoryTaskScheduler;
pub use runner::{ScheduledTask, TickRunner};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Name of the task that runs one batch-analysis tick.
pub const BATCH_ANALYZE_TASK: &str = "batch_analyze";

pub trait TaskScheduler: Send + Sync {
    /// Arm `task` to fire once, `delay` from now.
    fn schedule_once(&self, task: &str, delay: Duration);

    /// Disarm `task`. No-op when it is not armed.
    fn cancel(&self, task: &str);

    /// When `task` will next fire, if armed.
    fn next_scheduled(&self, task: &str) -> Option<DateTime<Utc>>;
}
