use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::debug;

use super::TaskScheduler;

/// Process-local scheduler.
///
/// Every change to the armed set wakes whoever waits on [`Self::changed`].
#[derive(Default)]
pub struct InMemoryTaskScheduler {
    due: Mutex<HashMap<String, DateTime<Utc>>>,
    notify: Notify,
}

impl InMemoryTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left until `task` fires. Zero when overdue, None when not armed.
    pub fn time_until(&self, task: &str) -> Option<Duration> {
        let due = self.due.lock().unwrap();
        due.get(task)
            .map(|at| (*at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Disarm `task` and return true if it was due.
    pub fn take_due(&self, task: &str) -> bool {
        let mut due = self.due.lock().unwrap();
        match due.get(task) {
            Some(at) if *at <= Utc::now() => {
                due.remove(task);
                true
            }
            _ => false,
        }
    }

    /// Resolves after the next arm or cancel.
    pub async fn changed(&self) {
        self.notify.notified().await
    }
}

impl TaskScheduler for InMemoryTaskScheduler {
    fn schedule_once(&self, task: &str, delay: Duration) {
        let at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        debug!("Arming task {} for {}", task, at);
        self.due.lock().unwrap().insert(task.to_string(), at);
        self.notify.notify_one();
    }

    fn cancel(&self, task: &str) {
        if self.due.lock().unwrap().remove(task).is_some() {
            debug!("Cancelled task {}", task);
            self.notify.notify_one();
        }
    }

    fn next_scheduled(&self, task: &str) -> Option<DateTime<Utc>> {
        self.due.lock().unwrap().get(task).copied()
    }
}
