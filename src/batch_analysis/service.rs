//! Public entry points of batch analysis.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::audit::{AnalysisAuditStore, AuditEntry};
use super::job_store::{JobStore, MetaJobStore};
use super::models::{AnalysisJob, JobState, JobView, TickReport};
use super::processor::{BatchProcessor, ProcessorSettings};
use super::queue::QueueManager;
use super::remote::RemoteAnalyzer;
use super::retry_policy::RetryPolicy;
use super::selection::AutoSelector;
use crate::config::BatchAnalysisSettings;
use crate::content_store::{ContentStore, ItemId};
use crate::metrics;
use crate::task_scheduler::{ScheduledTask, TaskScheduler, BATCH_ANALYZE_TASK};

/// Everything callers need, wired from explicit collaborators.
pub struct BatchAnalysisService {
    queue: QueueManager,
    processor: BatchProcessor,
    selector: AutoSelector,
    scheduler: Arc<dyn TaskScheduler>,
    audit: Arc<dyn AnalysisAuditStore>,
}

impl BatchAnalysisService {
    pub fn new(
        content: Arc<dyn ContentStore>,
        remote: Arc<dyn RemoteAnalyzer>,
        scheduler: Arc<dyn TaskScheduler>,
        audit: Arc<dyn AnalysisAuditStore>,
        settings: &BatchAnalysisSettings,
    ) -> Self {
        let jobs: Arc<dyn JobStore> = Arc::new(MetaJobStore::new(content.clone()));
        let processor = BatchProcessor::new(
            jobs.clone(),
            content.clone(),
            remote,
            scheduler.clone(),
            audit.clone(),
            RetryPolicy::new(settings),
            ProcessorSettings::from(settings),
        );
        Self {
            queue: QueueManager::new(jobs),
            processor,
            selector: AutoSelector::new(content, settings.analyzable_types.clone()),
            scheduler,
            audit,
        }
    }

    /// Queue items for analysis and make sure a tick is coming.
    pub fn enqueue_for_analysis(&self, item_ids: &[ItemId], link_mode: &str) -> Result<usize> {
        if item_ids.is_empty() {
            return Ok(0);
        }
        let previous = item_ids
            .iter()
            .map(|&id| Ok((id, self.queue.state_of(id)?)))
            .collect::<Result<HashMap<ItemId, Option<JobState>>>>()?;
        let jobs = self.queue.enqueue(item_ids, link_mode)?;
        for job in &jobs {
            let from = previous.get(&job.item_id).copied().flatten();
            self.audit_enqueued(from, job);
        }
        self.after_enqueue(jobs.len());
        Ok(jobs.len())
    }

    pub fn waiting_for_analysis(&self) -> Result<BTreeMap<ItemId, JobView>> {
        self.queue.waiting_for_analysis()
    }

    pub fn waiting_for_response(&self) -> Result<BTreeMap<ItemId, JobView>> {
        self.queue.waiting_for_response()
    }

    /// Run one tick now.
    pub async fn batch_analyze(&self) -> Result<TickReport> {
        self.processor.tick().await
    }

    /// Enqueue every published, never-analyzed item of an analyzable type.
    pub fn submit_auto_selected_posts(&self) -> Result<usize> {
        let count = self.selector.submit(&self.queue)?;
        if count > 0 {
            self.after_enqueue(count);
        }
        Ok(count)
    }

    pub fn get_state(&self, item_id: ItemId) -> Result<Option<JobState>> {
        self.queue.state_of(item_id)
    }

    pub fn get_job(&self, item_id: ItemId) -> Result<Option<AnalysisJob>> {
        self.queue.job(item_id)
    }

    pub fn history(&self, item_id: ItemId) -> Result<Vec<AuditEntry>> {
        self.audit.history(item_id)
    }

    fn after_enqueue(&self, count: usize) {
        metrics::record_enqueued(count);
        if self.scheduler.next_scheduled(BATCH_ANALYZE_TASK).is_none() {
            info!("Arming analysis tick for {} newly queued items", count);
            self.scheduler
                .schedule_once(BATCH_ANALYZE_TASK, Duration::ZERO);
        }
    }

    fn audit_enqueued(&self, from: Option<JobState>, job: &AnalysisJob) {
        if let Err(e) = self.audit.record(from, job, Some("enqueued")) {
            warn!("Failed to record audit entry for item {}: {:#}", job.item_id, e);
        }
    }
}

#[async_trait]
impl ScheduledTask for BatchAnalysisService {
    fn name(&self) -> &'static str {
        BATCH_ANALYZE_TASK
    }

    async fn run(&self) -> Result<()> {
        self.batch_analyze().await.map(|_| ())
    }

    fn has_pending_work(&self) -> Result<bool> {
        self.queue.has_pending_work()
    }
}
