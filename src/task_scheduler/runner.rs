use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{InMemoryTaskScheduler, TaskScheduler};

/// Work driven by the [`TickRunner`].
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Name under which the task is armed.
    fn name(&self) -> &'static str;

    /// Run once. The task re-arms itself when it wants to run again.
    async fn run(&self) -> Result<()>;

    /// Whether the task has work even though nothing armed it.
    fn has_pending_work(&self) -> Result<bool>;
}

/// Fires a [`ScheduledTask`] whenever its armed time falls due.
///
/// Also rescans periodically so that work appearing without an arm, such as
/// jobs enqueued by another process, is picked up.
pub struct TickRunner {
    scheduler: Arc<InMemoryTaskScheduler>,
    task: Arc<dyn ScheduledTask>,
    rescan_interval: Duration,
    shutdown_token: CancellationToken,
}

impl TickRunner {
    pub fn new(
        scheduler: Arc<InMemoryTaskScheduler>,
        task: Arc<dyn ScheduledTask>,
        rescan_interval: Duration,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            scheduler,
            task,
            rescan_interval,
            shutdown_token,
        }
    }

    pub async fn run(&self) {
        info!(
            "Starting tick runner for task {} (rescan every {:?})",
            self.task.name(),
            self.rescan_interval
        );
        self.rescan();

        loop {
            let sleep_duration = self
                .scheduler
                .time_until(self.task.name())
                .map_or(self.rescan_interval, |d| d.min(self.rescan_interval));
            debug!("Tick runner sleeping for {:?}", sleep_duration);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    if self.scheduler.take_due(self.task.name()) {
                        if let Err(e) = self.task.run().await {
                            error!("Task {} failed: {:#}", self.task.name(), e);
                        }
                    } else {
                        self.rescan();
                    }
                }
                _ = self.scheduler.changed() => {
                    // Due time moved; recompute the sleep.
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Tick runner received shutdown signal");
                    break;
                }
            }
        }

        info!("Tick runner stopped");
    }

    fn rescan(&self) {
        if self.scheduler.next_scheduled(self.task.name()).is_some() {
            return;
        }
        match self.task.has_pending_work() {
            Ok(true) => {
                info!("Found pending work for {}, arming", self.task.name());
                self.scheduler.schedule_once(self.task.name(), Duration::ZERO);
            }
            Ok(false) => {}
            Err(e) => error!("Failed to check pending work for {}: {:#}", self.task.name(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingTask {
        runs: AtomicUsize,
        pending: AtomicBool,
    }

    impl CountingTask {
        fn new(pending: bool) -> Self {
            Self {
                runs: AtomicUsize::new(0),
                pending: AtomicBool::new(pending),
            }
        }
    }

    #[async_trait]
    impl ScheduledTask for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.pending.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn has_pending_work(&self) -> Result<bool> {
            Ok(self.pending.load(Ordering::SeqCst))
        }
    }

    fn spawn_runner(
        scheduler: Arc<InMemoryTaskScheduler>,
        task: Arc<CountingTask>,
    ) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let token = CancellationToken::new();
        let runner = TickRunner::new(scheduler, task, Duration::from_secs(3600), token.clone());
        let handle = tokio::spawn(async move { runner.run().await });
        (token, handle)
    }

    #[tokio::test]
    async fn test_runs_task_when_armed() {
        let scheduler = Arc::new(InMemoryTaskScheduler::new());
        let task = Arc::new(CountingTask::new(false));
        let (token, handle) = spawn_runner(scheduler.clone(), task.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        scheduler.schedule_once("counting", Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert!(scheduler.next_scheduled("counting").is_none());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_arms_on_start_when_work_is_pending() {
        let scheduler = Arc::new(InMemoryTaskScheduler::new());
        let task = Arc::new(CountingTask::new(true));
        let (token, handle) = spawn_runner(scheduler.clone(), task.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let scheduler = Arc::new(InMemoryTaskScheduler::new());
        let task = Arc::new(CountingTask::new(false));
        let (token, handle) = spawn_runner(scheduler, task);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
